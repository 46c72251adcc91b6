//! Pure session transitions.
//!
//! `reduce` takes the current session and an event and returns the next
//! session, or the reason the event is not allowed. Network calls happen in
//! the orchestrator; nothing here performs I/O.

use super::model::{ReportContext, ReportSection, Session};
use super::stage::Stage;
use crate::error::SessionError;

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The engine reported requirements gathering is done.
    RequirementsCompleted,
    /// Preview text arrived from the engine.
    PreviewLoaded { preview: String },
    /// The backend accepted the visitor's contact details.
    LeadAccepted,
    /// Report generation was kicked off.
    GenerationStarted,
    /// The full report was fetched.
    ReportLoaded {
        context: ReportContext,
        lead_score: f64,
        refinements_left: u32,
    },
    /// The backend applied a refinement.
    RefinementAccepted {
        updates: ReportContext,
        sections: Option<Vec<ReportSection>>,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequirementsCompleted => "requirements_completed",
            Self::PreviewLoaded { .. } => "preview_loaded",
            Self::LeadAccepted => "lead_accepted",
            Self::GenerationStarted => "generation_started",
            Self::ReportLoaded { .. } => "report_loaded",
            Self::RefinementAccepted { .. } => "refinement_accepted",
        }
    }
}

/// Apply `event` to `session`.
pub fn reduce(session: &Session, event: SessionEvent) -> Result<Session, SessionError> {
    let mut next = session.clone();

    match event {
        SessionEvent::RequirementsCompleted => {
            // Repeated completion signals are harmless once past conversation.
            if session.stage == Stage::Conversation {
                advance(&mut next, Stage::Preview)?;
            }
        }

        SessionEvent::PreviewLoaded { preview } => {
            require_stage(session, Stage::Preview)?;
            // Blank text still counts; generation is not repeated for it.
            if next.preview.is_none() {
                next.preview = Some(preview);
            }
        }

        SessionEvent::LeadAccepted => {
            require_stage(session, Stage::Preview)?;
            if session.lead_captured {
                return Err(SessionError::LeadAlreadyCaptured);
            }
            next.lead_captured = true;
        }

        SessionEvent::GenerationStarted => {
            if !session.lead_captured {
                return Err(SessionError::LeadNotCaptured);
            }
            if session.stage != Stage::Generating {
                advance(&mut next, Stage::Generating)?;
            }
        }

        SessionEvent::ReportLoaded {
            context,
            lead_score,
            refinements_left,
        } => {
            match session.stage {
                Stage::Generating => advance(&mut next, Stage::ReportComplete)?,
                Stage::ReportComplete => {}
                actual => {
                    return Err(SessionError::InvalidStage {
                        expected: Stage::Generating,
                        actual,
                    });
                }
            }
            next.context.merge(&context, None);
            next.lead_score = lead_score;
            next.refinements_left = next.refinements_left.min(refinements_left);
        }

        SessionEvent::RefinementAccepted { updates, sections } => {
            require_stage(session, Stage::ReportComplete)?;
            if session.refinements_left == 0 {
                return Err(SessionError::BudgetExhausted);
            }
            next.refinements_left -= 1;
            next.context.merge(&updates, sections.as_deref());
        }
    }

    debug_assert!(next.stage >= session.stage, "stage regressed");
    debug_assert!(next.refinements_left <= session.refinements_left);
    Ok(next)
}

fn require_stage(session: &Session, expected: Stage) -> Result<(), SessionError> {
    if session.stage == expected {
        Ok(())
    } else {
        Err(SessionError::InvalidStage {
            expected,
            actual: session.stage,
        })
    }
}

fn advance(session: &mut Session, target: Stage) -> Result<(), SessionError> {
    if !session.stage.can_transition_to(target) {
        return Err(SessionError::InvalidTransition {
            from: session.stage,
            to: target,
        });
    }
    session.stage = target;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(stage: Stage) -> Session {
        let mut s = Session::new("s-1");
        s.stage = stage;
        if stage >= Stage::Generating {
            s.lead_captured = true;
        }
        s
    }

    fn report(text: &str) -> ReportContext {
        ReportContext {
            requirement_gathering: Some(format!("{text} requirements")),
            technical_architecture: Some(format!("{text} architecture")),
            ux_design: Some(format!("{text} ux")),
            business_strategy: Some(format!("{text} strategy")),
        }
    }

    fn loaded(context: ReportContext) -> SessionEvent {
        SessionEvent::ReportLoaded {
            context,
            lead_score: 80.0,
            refinements_left: 2,
        }
    }

    #[test]
    fn happy_path_walks_every_stage() {
        let s = Session::new("s-1");
        let s = reduce(&s, SessionEvent::RequirementsCompleted).unwrap();
        assert_eq!(s.stage, Stage::Preview);
        let s = reduce(
            &s,
            SessionEvent::PreviewLoaded {
                preview: "teaser".into(),
            },
        )
        .unwrap();
        let s = reduce(&s, SessionEvent::LeadAccepted).unwrap();
        assert!(s.lead_captured);
        assert_eq!(s.stage, Stage::Preview);
        let s = reduce(&s, SessionEvent::GenerationStarted).unwrap();
        assert_eq!(s.stage, Stage::Generating);
        let s = reduce(&s, loaded(report("v1"))).unwrap();
        assert_eq!(s.stage, Stage::ReportComplete);
        assert!(s.context.is_complete());
        assert_eq!(s.lead_score, 80.0);
    }

    #[test]
    fn events_never_regress_stage() {
        let events = [
            SessionEvent::RequirementsCompleted,
            SessionEvent::LeadAccepted,
            SessionEvent::GenerationStarted,
            loaded(report("v1")),
            SessionEvent::RequirementsCompleted,
            SessionEvent::PreviewLoaded {
                preview: "late".into(),
            },
            SessionEvent::RefinementAccepted {
                updates: report("v2"),
                sections: None,
            },
        ];
        let mut session = Session::new("s-1");
        let mut observed = vec![session.stage];
        for event in events {
            if let Ok(next) = reduce(&session, event) {
                session = next;
            }
            observed.push(session.stage);
        }
        assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
        assert_eq!(session.stage, Stage::ReportComplete);
    }

    #[test]
    fn preview_is_cached_once() {
        let s = at(Stage::Preview);
        let s = reduce(
            &s,
            SessionEvent::PreviewLoaded {
                preview: "first".into(),
            },
        )
        .unwrap();
        let s = reduce(
            &s,
            SessionEvent::PreviewLoaded {
                preview: "second".into(),
            },
        )
        .unwrap();
        assert_eq!(s.preview.as_deref(), Some("first"));
    }

    #[test]
    fn blank_preview_still_counts_as_loaded() {
        let s = reduce(
            &at(Stage::Preview),
            SessionEvent::PreviewLoaded {
                preview: "  ".into(),
            },
        )
        .unwrap();
        assert_eq!(s.preview.as_deref(), Some("  "));
    }

    #[test]
    fn generation_requires_lead() {
        let s = at(Stage::Preview);
        assert_eq!(
            reduce(&s, SessionEvent::GenerationStarted),
            Err(SessionError::LeadNotCaptured)
        );
    }

    #[test]
    fn lead_is_captured_once() {
        let s = reduce(&at(Stage::Preview), SessionEvent::LeadAccepted).unwrap();
        assert_eq!(
            reduce(&s, SessionEvent::LeadAccepted),
            Err(SessionError::LeadAlreadyCaptured)
        );
    }

    #[test]
    fn lead_outside_preview_rejected() {
        assert!(matches!(
            reduce(&at(Stage::Conversation), SessionEvent::LeadAccepted),
            Err(SessionError::InvalidStage { .. })
        ));
    }

    #[test]
    fn report_before_generation_rejected() {
        assert!(matches!(
            reduce(&at(Stage::Preview), loaded(report("v1"))),
            Err(SessionError::InvalidStage { .. })
        ));
    }

    #[test]
    fn report_reload_never_raises_budget() {
        let mut s = at(Stage::ReportComplete);
        s.refinements_left = 1;
        let s = reduce(&s, loaded(report("v1"))).unwrap();
        assert_eq!(s.refinements_left, 1);
    }

    #[test]
    fn refinement_decrements_by_one_and_merges() {
        let s = reduce(&at(Stage::Generating), loaded(report("v1"))).unwrap();
        let s = reduce(
            &s,
            SessionEvent::RefinementAccepted {
                updates: report("v2"),
                sections: Some(vec![ReportSection::TechnicalArchitecture]),
            },
        )
        .unwrap();
        assert_eq!(s.refinements_left, 1);
        assert_eq!(
            s.context.get(ReportSection::TechnicalArchitecture),
            Some("v2 architecture")
        );
        assert_eq!(
            s.context.get(ReportSection::UxDesign),
            Some("v1 ux"),
            "unrelated sections untouched"
        );

        let s = reduce(
            &s,
            SessionEvent::RefinementAccepted {
                updates: ReportContext::default(),
                sections: None,
            },
        )
        .unwrap();
        assert_eq!(s.refinements_left, 0);
        assert!(s.context.is_complete());

        assert_eq!(
            reduce(
                &s,
                SessionEvent::RefinementAccepted {
                    updates: report("v3"),
                    sections: None,
                },
            ),
            Err(SessionError::BudgetExhausted)
        );
    }
}
