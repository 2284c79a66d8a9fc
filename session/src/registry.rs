use dap::types::SourceBreakpoint;
use wire::SourceLocation;

/// Per-file breakpoint lists, the single source of truth for the session.
///
/// Files iterate in first-submission order and breakpoints within a file in
/// editor-submission order; nothing is sorted or validated against source
/// content. The registry does no I/O, broadcasting a dump after a mutation
/// is the caller's job.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    files: Vec<FileBreakpoints>,
}

#[derive(Debug)]
struct FileBreakpoints {
    path: String,
    breakpoints: Vec<SourceBreakpoint>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `breakpoints` as the complete set for `path`, replacing any
    /// prior list for that file.
    pub fn replace(&mut self, path: impl Into<String>, breakpoints: Vec<SourceBreakpoint>) {
        let path = path.into();
        match self.files.iter_mut().find(|file| file.path == path) {
            Some(file) => file.breakpoints = breakpoints,
            None => self.files.push(FileBreakpoints { path, breakpoints }),
        }
    }

    /// All `(path, breakpoint)` pairs in deterministic dump order.
    pub fn all_entries(&self) -> impl Iterator<Item = (&str, &SourceBreakpoint)> {
        self.files.iter().flat_map(|file| {
            file.breakpoints
                .iter()
                .map(move |breakpoint| (file.path.as_str(), breakpoint))
        })
    }

    /// The registry contents in wire form, ready to encode as a dump.
    pub fn to_dump(&self) -> Vec<SourceLocation> {
        self.all_entries()
            .map(|(path, breakpoint)| SourceLocation {
                path: path.to_owned(),
                line: breakpoint.line,
            })
            .collect()
    }
}
