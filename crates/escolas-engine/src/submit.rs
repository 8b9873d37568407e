//! Filter submission and the post-apply settle wait.

use std::sync::OnceLock;

use escolas_driver::Page;
use regex::Regex;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::timing::TimingProfile;

/// Known shapes of the apply trigger. Its concrete identity shifts between
/// portal deployments, so the chain goes from specific to generic.
const APPLY_SELECTORS: &[&str] = &[
    "input[value='Aplicar']",
    "#gobtn",
    ".promptApplyButton",
    "a[onclick*='apply']",
    "a[href*='apply']",
];

/// Locate and activate the apply trigger. Exhausting every strategy —
/// including the manual text scan over interactive elements — is fatal for
/// the run.
pub async fn submit_filters(page: &dyn Page) -> Result<(), EngineError> {
    for selector in APPLY_SELECTORS {
        if page.click(selector).await? {
            info!(selector, "apply trigger activated");
            return Ok(());
        }
    }
    if page.click_text(&["a", "button"], "Aplicar", true).await? {
        info!("apply trigger activated via text scan");
        return Ok(());
    }
    Err(EngineError::SubmissionTriggerNotFound)
}

fn confirmation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Foram selecionadas[^0-9]*([0-9.,]+)[^0-9]*escolas").expect("static regex")
    })
}

/// Wait out the portal's recomputation, then opportunistically scrape the
/// "N escolas" confirmation from the page text. There is no structured
/// completion signal; the settle duration is a heuristic and the absence of
/// a confirmation match is not an error.
pub async fn await_settle(
    page: &dyn Page,
    timing: &TimingProfile,
) -> Result<Option<u64>, EngineError> {
    tokio::time::sleep(timing.submit_settle).await;
    let body = page.body_text().await?;
    let count = parse_confirmation_count(&body);
    if count.is_none() {
        debug!("no selection confirmation found in page text");
    }
    Ok(count)
}

pub fn parse_confirmation_count(body: &str) -> Option<u64> {
    confirmation_pattern()
        .captures(body)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().replace(['.', ','], "").parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use escolas_driver::mock::{MockPage, TriggerPresence};

    #[tokio::test]
    async fn apply_found_through_selector_chain() {
        let page = MockPage::new();
        page.set_apply(TriggerPresence::Css);
        assert!(submit_filters(&page).await.is_ok());
    }

    #[tokio::test]
    async fn apply_found_through_manual_text_scan() {
        let page = MockPage::new();
        page.set_apply(TriggerPresence::TextOnly);
        assert!(submit_filters(&page).await.is_ok());
        assert!(page.call_position("click apply").is_some());
    }

    #[tokio::test]
    async fn missing_apply_is_fatal() {
        let page = MockPage::new();
        page.set_apply(TriggerPresence::Absent);
        let error = submit_filters(&page).await.unwrap_err();
        assert!(matches!(error, EngineError::SubmissionTriggerNotFound));
    }

    #[tokio::test]
    async fn settle_scrapes_the_confirmation_count() {
        let page = MockPage::new();
        page.set_body_text("Resultado: Foram selecionadas 224.797 escolas no total.");
        let count = await_settle(&page, &TimingProfile::instant()).await.unwrap();
        assert_eq!(count, Some(224_797));
    }

    #[test]
    fn confirmation_parsing() {
        assert_eq!(
            parse_confirmation_count("Foram selecionadas 1.234 escolas"),
            Some(1234)
        );
        assert_eq!(parse_confirmation_count("Foram selecionadas 7 escolas"), Some(7));
        assert_eq!(parse_confirmation_count("nenhum resultado"), None);
    }
}
