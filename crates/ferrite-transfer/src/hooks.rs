//! Server-side hook points.
//!
//! Hooks are registered values, not discovered executables: a server
//! embedding this crate installs whatever callbacks it wants and the
//! session asks the registry, never the environment. Hook text reaches
//! the client over side-band channel 2, error lines with the `error: `
//! prefix clients expect.

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_refs::RefName;

/// What one pushed command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCommandKind {
    /// old = zero.
    Create,
    /// new = zero.
    Delete,
    /// Both non-zero.
    Update,
}

/// One `<old> <new> <ref>` command of a push.
#[derive(Debug, Clone)]
pub struct RefCommand {
    pub old: Oid,
    pub new: Oid,
    pub name: RefName,
}

impl RefCommand {
    pub fn kind(&self) -> RefCommandKind {
        match (self.old.is_zero(), self.new.is_zero()) {
            (true, _) => RefCommandKind::Create,
            (_, true) => RefCommandKind::Delete,
            _ => RefCommandKind::Update,
        }
    }
}

/// Buffered user-visible output of a hook run.
///
/// `send_message` lines pass through as-is; `send_error` lines gain the
/// `error: ` prefix. The session flushes the buffer to band 2 in order,
/// so the client sees exactly the interleaving the hook produced.
#[derive(Debug, Default)]
pub struct HookContext {
    messages: BString,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain line for the user.
    pub fn send_message(&mut self, line: &str) {
        self.messages.extend_from_slice(line.as_bytes());
        self.messages.push(b'\n');
    }

    /// An error line for the user (`error: <line>`).
    pub fn send_error(&mut self, line: &str) {
        self.messages.extend_from_slice(b"error: ");
        self.messages.extend_from_slice(line.as_bytes());
        self.messages.push(b'\n');
    }

    /// Everything accumulated so far.
    pub fn messages(&self) -> &BString {
        &self.messages
    }

    pub(crate) fn take(&mut self) -> BString {
        std::mem::take(&mut self.messages)
    }
}

/// Decide the fate of a whole command set (pre-receive).
pub type SetHook = Box<dyn FnMut(&mut HookContext, &[RefCommand]) -> Result<(), String> + Send>;
/// Decide the fate of one command (update).
pub type CommandHook = Box<dyn FnMut(&mut HookContext, &RefCommand) -> Result<(), String> + Send>;
/// Observe a finished transfer (post-receive, pre/post-upload).
pub type NotifyHook = Box<dyn FnMut(&mut HookContext, &[RefCommand]) + Send>;
/// Observe an upload (wants are ids, not ref commands).
pub type UploadHook = Box<dyn FnMut(&mut HookContext, &[Oid]) + Send>;

/// The registry a server session consults.
#[derive(Default)]
pub struct Hooks {
    pub pre_receive: Option<SetHook>,
    pub update: Option<CommandHook>,
    pub post_receive: Option<NotifyHook>,
    pub pre_upload: Option<UploadHook>,
    pub post_upload: Option<UploadHook>,
}

impl Hooks {
    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, ferrite_hash::HashKind::Sha1).unwrap()
    }

    #[test]
    fn command_kinds() {
        let name = RefName::new("refs/heads/main").unwrap();
        let create = RefCommand {
            old: Oid::ZERO_SHA1,
            new: oid(1),
            name: name.clone(),
        };
        let delete = RefCommand {
            old: oid(1),
            new: Oid::ZERO_SHA1,
            name: name.clone(),
        };
        let update = RefCommand {
            old: oid(1),
            new: oid(2),
            name,
        };
        assert_eq!(create.kind(), RefCommandKind::Create);
        assert_eq!(delete.kind(), RefCommandKind::Delete);
        assert_eq!(update.kind(), RefCommandKind::Update);
    }

    #[test]
    fn message_interleaving_is_preserved() {
        let mut ctx = HookContext::new();
        ctx.send_message("message line 1");
        ctx.send_error("no soup for you!");
        ctx.send_message("come back next year!");
        assert_eq!(
            ctx.messages().to_string(),
            "message line 1\nerror: no soup for you!\ncome back next year!\n"
        );
    }
}
