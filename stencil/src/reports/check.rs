//! Check command report data structures.

use super::output::{Output, Report};

/// Report data from a successful compilation.
#[derive(Debug)]
pub struct CheckReport {
    /// Source files compiled.
    pub files: usize,
    /// Templates defined by the sources.
    pub templates: usize,
    /// Dependency files consulted.
    pub dependencies: usize,
}

impl Report for CheckReport {
    fn render(&self, out: &mut dyn Output) {
        let mut line = format!(
            "✓ {} template{} in {} file{}",
            self.templates,
            plural(self.templates),
            self.files,
            plural(self.files)
        );
        if self.dependencies > 0 {
            line.push_str(&format!(
                " ({} dependenc{})",
                self.dependencies,
                if self.dependencies == 1 { "y" } else { "ies" }
            ));
        }
        out.preformatted(&line);
    }
}

pub(super) fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::output::BufferOutput;

    #[test]
    fn test_render() {
        let mut out = BufferOutput::default();
        CheckReport {
            files: 2,
            templates: 1,
            dependencies: 1,
        }
        .render(&mut out);
        assert_eq!(out.lines, vec!["✓ 1 template in 2 files (1 dependency)"]);
    }
}
