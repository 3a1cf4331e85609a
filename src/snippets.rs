//! Code snippets compiled into the binary

/// A piece of code and the archive entry it belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snippet {
    /// Name used to select the snippet on the command line
    pub name: &'static str,
    /// Base name of the entry the code is appended to
    pub target: &'static str,
    /// The code itself
    pub code: &'static str,
}

/// Removes enemy units and spawners on a timer
pub const BITER_KILLER: Snippet = Snippet {
    name: "biter-killer",
    target: "control.lua",
    code: include_str!("../lua/biter_killer.lua"),
};

const BUILT_IN: &[Snippet] = &[BITER_KILLER];

/// All built-in snippets
pub fn all() -> &'static [Snippet] {
    BUILT_IN
}

/// Look up a built-in snippet by name
pub fn find(name: &str) -> Option<&'static Snippet> {
    BUILT_IN.iter().find(|snippet| snippet.name == name)
}
