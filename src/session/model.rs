//! Session and report data models.

use serde::{Deserialize, Serialize};

use super::stage::Stage;
use crate::client::SessionRecord;

/// Refinements granted with every report.
pub const REFINEMENT_BUDGET: u32 = 2;

/// The named sections of a full report, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    RequirementGathering,
    TechnicalArchitecture,
    UxDesign,
    BusinessStrategy,
}

impl ReportSection {
    pub const ALL: [ReportSection; 4] = [
        Self::RequirementGathering,
        Self::TechnicalArchitecture,
        Self::UxDesign,
        Self::BusinessStrategy,
    ];

    /// Wire key, as used in `context` and `updated_sections`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::RequirementGathering => "requirement_gathering",
            Self::TechnicalArchitecture => "technical_architecture",
            Self::UxDesign => "ux_design",
            Self::BusinessStrategy => "business_strategy",
        }
    }

    /// Heading used in exports.
    pub fn title(&self) -> &'static str {
        match self {
            Self::RequirementGathering => "REQUIREMENTS ANALYSIS",
            Self::TechnicalArchitecture => "TECHNICAL ARCHITECTURE",
            Self::UxDesign => "UX DESIGN",
            Self::BusinessStrategy => "BUSINESS STRATEGY",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key.trim())
    }
}

/// Report sections; each is filled in as generation progresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_gathering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ux_design: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_strategy: Option<String>,
}

impl ReportContext {
    pub fn get(&self, section: ReportSection) -> Option<&str> {
        self.slot(section).as_deref().filter(|s| !s.trim().is_empty())
    }

    fn slot(&self, section: ReportSection) -> &Option<String> {
        match section {
            ReportSection::RequirementGathering => &self.requirement_gathering,
            ReportSection::TechnicalArchitecture => &self.technical_architecture,
            ReportSection::UxDesign => &self.ux_design,
            ReportSection::BusinessStrategy => &self.business_strategy,
        }
    }

    fn slot_mut(&mut self, section: ReportSection) -> &mut Option<String> {
        match section {
            ReportSection::RequirementGathering => &mut self.requirement_gathering,
            ReportSection::TechnicalArchitecture => &mut self.technical_architecture,
            ReportSection::UxDesign => &mut self.ux_design,
            ReportSection::BusinessStrategy => &mut self.business_strategy,
        }
    }

    /// Sections that currently hold text.
    pub fn populated(&self) -> Vec<ReportSection> {
        ReportSection::ALL
            .into_iter()
            .filter(|s| self.get(*s).is_some())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.populated().len() == ReportSection::ALL.len()
    }

    /// Copy sections from `updates` into `self`.
    ///
    /// Only `only` sections are considered when given, every section
    /// otherwise. Empty incoming text never overwrites a populated section.
    /// Returns the sections that changed.
    pub fn merge(
        &mut self,
        updates: &ReportContext,
        only: Option<&[ReportSection]>,
    ) -> Vec<ReportSection> {
        let candidates: Vec<ReportSection> = match only {
            Some(sections) => sections.to_vec(),
            None => ReportSection::ALL.to_vec(),
        };

        let mut changed = Vec::new();
        for section in candidates {
            let Some(text) = updates.get(section) else {
                continue;
            };
            let slot = self.slot_mut(section);
            if slot.as_deref() != Some(text) {
                *slot = Some(text.to_string());
                changed.push(section);
            }
        }
        changed
    }
}

/// Local view of one idea's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub stage: Stage,
    pub context: ReportContext,
    pub lead_captured: bool,
    pub refinements_left: u32,
    pub lead_score: f64,
    /// Preview text, fetched once per session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl Session {
    /// A freshly started session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stage: Stage::Conversation,
            context: ReportContext::default(),
            lead_captured: false,
            refinements_left: REFINEMENT_BUDGET,
            lead_score: 0.0,
            preview: None,
        }
    }

    /// Rebuild the local view from the backend's record of a session.
    ///
    /// A captured lead means generation was requested, so such a session is
    /// at least `Generating` whatever stage the backend reports.
    pub fn from_record(record: &SessionRecord) -> Self {
        let reported = record.stage.parse::<Stage>().unwrap_or_else(|e| {
            tracing::warn!(session_id = %record.session_id, "{e}, assuming conversation");
            Stage::Conversation
        });
        let stage = if record.lead_captured {
            reported.max(Stage::Generating)
        } else {
            reported.min(Stage::Preview)
        };

        Self {
            session_id: record.session_id.clone(),
            stage,
            context: record.context.clone(),
            lead_captured: record.lead_captured,
            refinements_left: record.refinements_left.min(REFINEMENT_BUDGET),
            lead_score: record.lead_score,
            preview: None,
        }
    }

    pub fn can_refine(&self) -> bool {
        self.stage == Stage::ReportComplete && self.refinements_left > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(ReportSection, &str)]) -> ReportContext {
        let mut ctx = ReportContext::default();
        for (section, text) in pairs {
            *ctx.slot_mut(*section) = Some(text.to_string());
        }
        ctx
    }

    fn record(stage: &str, lead_captured: bool) -> SessionRecord {
        SessionRecord {
            session_id: "s-1".into(),
            user_id: "user_1".into(),
            idea: "A marketplace for dog walkers".into(),
            stage: stage.into(),
            context: ReportContext::default(),
            lead_captured,
            refinements_left: 2,
            lead_score: 42.0,
            conversation_history: None,
        }
    }

    #[test]
    fn section_keys_roundtrip() {
        for section in ReportSection::ALL {
            assert_eq!(ReportSection::from_key(section.key()), Some(section));
            let json = serde_json::to_string(&section).unwrap();
            assert_eq!(json, format!("\"{}\"", section.key()));
        }
        assert_eq!(ReportSection::from_key("pricing"), None);
    }

    #[test]
    fn merge_replaces_only_named_sections() {
        let mut ctx = context(&[
            (ReportSection::RequirementGathering, "req v1"),
            (ReportSection::UxDesign, "ux v1"),
        ]);
        let updates = context(&[
            (ReportSection::RequirementGathering, "req v2"),
            (ReportSection::UxDesign, "ux v2"),
        ]);

        let changed = ctx.merge(&updates, Some(&[ReportSection::UxDesign][..]));
        assert_eq!(changed, vec![ReportSection::UxDesign]);
        assert_eq!(ctx.get(ReportSection::RequirementGathering), Some("req v1"));
        assert_eq!(ctx.get(ReportSection::UxDesign), Some("ux v2"));
    }

    #[test]
    fn merge_never_empties_a_section() {
        let mut ctx = context(&[(ReportSection::BusinessStrategy, "strategy")]);
        let updates = context(&[(ReportSection::BusinessStrategy, "   ")]);

        let changed = ctx.merge(&updates, None);
        assert!(changed.is_empty());
        assert_eq!(ctx.get(ReportSection::BusinessStrategy), Some("strategy"));
    }

    #[test]
    fn merge_without_filter_fills_everything() {
        let mut ctx = ReportContext::default();
        let full = context(&[
            (ReportSection::RequirementGathering, "a"),
            (ReportSection::TechnicalArchitecture, "b"),
            (ReportSection::UxDesign, "c"),
            (ReportSection::BusinessStrategy, "d"),
        ]);
        assert_eq!(ctx.merge(&full, None).len(), 4);
        assert!(ctx.is_complete());
    }

    #[test]
    fn context_deserializes_partial() {
        let ctx: ReportContext =
            serde_json::from_str(r#"{"ux_design": "flows", "business_strategy": null}"#).unwrap();
        assert_eq!(ctx.populated(), vec![ReportSection::UxDesign]);
    }

    #[test]
    fn from_record_lifts_captured_lead_to_generating() {
        let session = Session::from_record(&record("preview", true));
        assert_eq!(session.stage, Stage::Generating);

        let session = Session::from_record(&record("report_complete", true));
        assert_eq!(session.stage, Stage::ReportComplete);
    }

    #[test]
    fn from_record_without_lead_stops_at_preview() {
        assert_eq!(
            Session::from_record(&record("conversation", false)).stage,
            Stage::Conversation
        );
        assert_eq!(
            Session::from_record(&record("generating", false)).stage,
            Stage::Preview
        );
        assert_eq!(
            Session::from_record(&record("mystery", false)).stage,
            Stage::Conversation
        );
    }

    #[test]
    fn new_session_has_full_budget() {
        let session = Session::new("s-1");
        assert_eq!(session.stage, Stage::Conversation);
        assert_eq!(session.refinements_left, REFINEMENT_BUDGET);
        assert!(!session.lead_captured);
        assert!(!session.can_refine());
    }
}
