//! Analyze command report data structures.

use super::{
    check::plural,
    output::{Output, Report},
};

#[derive(Debug)]
pub struct TemplateInfo {
    pub name: String,
    pub kind: String,
    pub params: usize,
    pub location: String,
}

/// Report data from an analysis compilation.
#[derive(Debug)]
pub struct AnalyzeReport {
    /// Whether every source parsed. Without it there is no registry.
    pub parsed: bool,
    pub templates: Vec<TemplateInfo>,
    /// Problems already written to the warning sink.
    pub problems: usize,
}

impl Report for AnalyzeReport {
    fn render(&self, out: &mut dyn Output) {
        if !self.parsed {
            out.warning("some sources failed to parse; no templates to list");
        } else {
            out.section("Templates");
            for t in &self.templates {
                out.list_item(&format!(
                    "{} {} ({} param{}) at {}",
                    t.kind,
                    t.name,
                    t.params,
                    plural(t.params),
                    t.location
                ));
            }
        }

        if self.problems > 0 {
            out.newline();
            out.preformatted(&format!(
                "{} problem{} reported",
                self.problems,
                plural(self.problems)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::output::BufferOutput;

    #[test]
    fn test_render_templates() {
        let mut out = BufferOutput::default();
        AnalyzeReport {
            parsed: true,
            templates: vec![TemplateInfo {
                name: "app.page".into(),
                kind: "template".into(),
                params: 1,
                location: "a.st:1:14".into(),
            }],
            problems: 2,
        }
        .render(&mut out);
        assert_eq!(
            out.lines,
            vec![
                "Templates:",
                "  - template app.page (1 param) at a.st:1:14",
                "",
                "2 problems reported",
            ]
        );
    }

    #[test]
    fn test_render_parse_failure() {
        let mut out = BufferOutput::default();
        AnalyzeReport {
            parsed: false,
            templates: Vec::new(),
            problems: 1,
        }
        .render(&mut out);
        assert_eq!(
            out.lines[0],
            "warning: some sources failed to parse; no templates to list"
        );
    }
}
