//! Plain-text and JSON renderings of a report.

use super::model::{ReportContext, ReportSection};

const TITLE: &str = "AI AGENT STRATEGIC REPORT";

/// Export format for a completed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
        }
    }
}

/// File name a report for `session_id` is saved under.
pub fn export_file_name(session_id: &str, extension: &str) -> String {
    let prefix: String = session_id.chars().take(8).collect();
    format!("ai-agent-report-{prefix}.{extension}")
}

pub fn render(context: &ReportContext, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Text => Ok(render_text(context)),
        ExportFormat::Json => serde_json::to_string_pretty(context),
    }
}

/// Every section under an underlined heading; missing sections read `N/A`.
pub fn render_text(context: &ReportContext) -> String {
    let mut out = String::new();
    underline(&mut out, TITLE, '=');
    for section in ReportSection::ALL {
        out.push('\n');
        underline(&mut out, section.title(), '-');
        out.push_str(context.get(section).unwrap_or("N/A").trim());
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn underline(out: &mut String, heading: &str, ch: char) {
    out.push_str(heading);
    out.push('\n');
    out.extend(std::iter::repeat_n(ch, heading.len()));
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_export_marks_missing_sections() {
        let ctx = ReportContext {
            requirement_gathering: Some("Creators need scheduling".into()),
            ux_design: Some("  ".into()),
            ..Default::default()
        };
        let text = render_text(&ctx);
        assert!(text.starts_with("AI AGENT STRATEGIC REPORT\n========================="));
        assert!(
            text.contains("REQUIREMENTS ANALYSIS\n---------------------\nCreators need scheduling")
        );
        assert!(text.contains("UX DESIGN\n---------\nN/A"));
        assert!(text.ends_with("BUSINESS STRATEGY\n-----------------\nN/A"));
    }

    #[test]
    fn json_export_keeps_section_keys() {
        let ctx = ReportContext {
            business_strategy: Some("Freemium".into()),
            ..Default::default()
        };
        let json = render(&ctx, ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["business_strategy"], "Freemium");
        assert!(value.get("ux_design").is_none());
    }

    #[test]
    fn file_name_uses_id_prefix() {
        assert_eq!(
            export_file_name("0b1c2d3e-aaaa-bbbb", "pdf"),
            "ai-agent-report-0b1c2d3e.pdf"
        );
        assert_eq!(export_file_name("abc", "txt"), "ai-agent-report-abc.txt");
    }
}
