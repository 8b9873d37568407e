//! Selection strategy engine.
//!
//! Marks a single field as "all values" through an ordered chain of
//! strategies, because no single technique works across the portal's markup
//! variants. The chain stops at the first strategy that activates a
//! matching control; the displayed value is then re-read as verification,
//! never assumed.

use async_trait::async_trait;
use escolas_driver::{DriverResult, Page, ValueOption, WaitState};
use tracing::{debug, info, warn};

use crate::timing::TimingProfile;
use crate::types::{FilterField, SelectionOutcome, SkipReason};

pub const VALUE_LIST_SELECTOR: &str = "div.DropDownValueList";

/// Whether a displayed value means "no restriction on this field". Covers
/// both the short form and the full `(Todos os Valores de Colunas)` text.
pub fn has_all_values_text(value: &str) -> bool {
    value.contains("Todos os Valores")
}

#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Try to mark "all values" on the currently revealed value list.
    /// `Ok(false)` means the strategy does not apply here; the chain moves
    /// on.
    async fn attempt(&self, page: &dyn Page) -> DriverResult<bool>;
}

/// A control whose identifying attribute references the blanket option
/// directly.
struct AllMarkerAttribute;

#[async_trait]
impl SelectionStrategy for AllMarkerAttribute {
    fn name(&self) -> &'static str {
        "all-marker-attribute"
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<bool> {
        let options = page.list_options(VALUE_LIST_SELECTOR).await?;
        let Some(option) = options
            .iter()
            .find(|o| o.id.contains("All") || o.value.contains("All"))
        else {
            return Ok(false);
        };
        ensure_checked(page, option).await?;
        Ok(true)
    }
}

/// A control adjacent to the literal "all values" text.
struct AllValuesText;

#[async_trait]
impl SelectionStrategy for AllValuesText {
    fn name(&self) -> &'static str {
        "all-values-text"
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<bool> {
        let options = page.list_options(VALUE_LIST_SELECTOR).await?;
        let Some(option) = options.iter().find(|o| has_all_values_text(&o.text)) else {
            return Ok(false);
        };
        ensure_checked(page, option).await?;
        Ok(true)
    }
}

/// Positional fallback: on every observed variant the first entry of the
/// list is the blanket option. Only applies to a fresh list — once entries
/// are selected, position alone cannot claim blanket semantics.
struct FirstOption;

#[async_trait]
impl SelectionStrategy for FirstOption {
    fn name(&self) -> &'static str {
        "first-option"
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<bool> {
        let options = page.list_options(VALUE_LIST_SELECTOR).await?;
        if options.is_empty() || options.iter().any(|o| o.checked) {
            return Ok(false);
        }
        page.toggle_option(VALUE_LIST_SELECTOR, 0).await?;
        Ok(true)
    }
}

/// Last resort: collapse an existing multi-selection down to its first
/// entry.
struct DeselectExtras;

#[async_trait]
impl SelectionStrategy for DeselectExtras {
    fn name(&self) -> &'static str {
        "deselect-extras"
    }

    async fn attempt(&self, page: &dyn Page) -> DriverResult<bool> {
        let options = page.list_options(VALUE_LIST_SELECTOR).await?;
        let checked: Vec<usize> = options
            .iter()
            .filter(|o| o.checked)
            .map(|o| o.index)
            .collect();
        let Some((&first, extras)) = checked.split_first() else {
            return Ok(false);
        };
        for &index in extras {
            page.toggle_option(VALUE_LIST_SELECTOR, index).await?;
        }
        // The first entry must end up selected.
        let after = page.list_options(VALUE_LIST_SELECTOR).await?;
        if !after.get(first).map(|o| o.checked).unwrap_or(false) {
            page.toggle_option(VALUE_LIST_SELECTOR, first).await?;
        }
        Ok(true)
    }
}

async fn ensure_checked(page: &dyn Page, option: &ValueOption) -> DriverResult<()> {
    if !option.checked {
        page.toggle_option(VALUE_LIST_SELECTOR, option.index).await?;
    }
    Ok(())
}

pub fn strategy_chain() -> Vec<Box<dyn SelectionStrategy>> {
    vec![
        Box::new(AllMarkerAttribute),
        Box::new(AllValuesText),
        Box::new(FirstOption),
        Box::new(DeselectExtras),
    ]
}

/// Configure one field to "all values".
///
/// Preconditions produce early, non-fatal outcomes; a field already
/// displaying "all values" short-circuits without touching remote state.
pub async fn configure_all_values(
    page: &dyn Page,
    field: &FilterField,
    timing: &TimingProfile,
) -> DriverResult<SelectionOutcome> {
    let input = field.input_selector();
    let label = field.display_label();

    if !page
        .wait_for(&input, WaitState::Attached, timing.element_wait)
        .await?
    {
        return Ok(SelectionOutcome::skipped(SkipReason::NotFound));
    }
    if !page.is_visible(&input).await? {
        return Ok(SelectionOutcome::skipped(SkipReason::Hidden));
    }
    if !page.is_enabled(&input).await? {
        return Ok(SelectionOutcome::skipped(SkipReason::Disabled));
    }

    if let Some(current) = page.input_value(&input).await?
        && has_all_values_text(&current)
    {
        debug!(field = label, "already at all values");
        return Ok(SelectionOutcome::achieved(true));
    }

    if !page.click(&field.icon_selector()).await? {
        return Ok(SelectionOutcome::skipped(SkipReason::NotFound));
    }
    tokio::time::sleep(timing.menu_reveal).await;

    let mut applied = None;
    for strategy in strategy_chain() {
        match strategy.attempt(page).await {
            Ok(true) => {
                applied = Some(strategy.name());
                break;
            }
            Ok(false) => continue,
            Err(error) => {
                warn!(field = label, strategy = strategy.name(), %error, "strategy failed, trying next");
                continue;
            }
        }
    }

    tokio::time::sleep(timing.post_toggle).await;
    close_selection_surface(page, field, timing).await?;

    let Some(strategy) = applied else {
        warn!(field = label, "selection strategy chain exhausted");
        return Ok(SelectionOutcome::failed());
    };

    let final_value = page.input_value(&input).await?.unwrap_or_default();
    let has_all_values = has_all_values_text(&final_value);
    info!(
        field = label,
        strategy,
        value = %final_value,
        all_values = has_all_values,
        "field configured"
    );
    Ok(SelectionOutcome::achieved(has_all_values))
}

/// Close the value list without discarding the selection: confirm control
/// first, then re-toggling the opening icon, then a click outside. A
/// cancel-style dismissal (Escape) reverts the selection and must never be
/// used.
async fn close_selection_surface(
    page: &dyn Page,
    field: &FilterField,
    timing: &TimingProfile,
) -> DriverResult<()> {
    let confirmed = page.click_text(&["button"], "OK", true).await?
        || page.click("input[value='OK']").await?
        || page.click_text(&["button"], "Aplicar", true).await?
        || page.click_text(&["a"], "OK", true).await?;

    if !confirmed && !page.click(&field.icon_selector()).await? {
        page.click_at(100.0, 100.0).await?;
    }
    tokio::time::sleep(timing.menu_close).await;

    if !page
        .wait_for(VALUE_LIST_SELECTOR, WaitState::Hidden, timing.control_wait)
        .await?
    {
        // Still open; force it shut from outside.
        page.click_at(100.0, 100.0).await?;
        tokio::time::sleep(timing.post_toggle).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use escolas_driver::mock::{MockField, MockOption, MockPage, ALL_VALUES_OPTION_TEXT};

    fn field(input_id: &str, label: &str) -> FilterField {
        FilterField {
            input_id: input_id.to_string(),
            icon_id: format!("{input_id}_dropdownIcon"),
            label: Some(label.to_string()),
        }
    }

    #[tokio::test]
    async fn detached_field_reports_not_found() {
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("Região")).detached());

        let outcome = configure_all_values(&page, &field("saw_1", "Região"), &TimingProfile::instant())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.skip, Some(SkipReason::NotFound));
    }

    #[tokio::test]
    async fn hidden_and_disabled_fields_are_skipped() {
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("UF")).hidden());
        page.push_field(MockField::new("saw_2", Some("Município")).disabled());

        let timing = TimingProfile::instant();
        let outcome = configure_all_values(&page, &field("saw_1", "UF"), &timing)
            .await
            .unwrap();
        assert_eq!(outcome.skip, Some(SkipReason::Hidden));

        let outcome = configure_all_values(&page, &field("saw_2", "Município"), &timing)
            .await
            .unwrap();
        assert_eq!(outcome.skip, Some(SkipReason::Disabled));
    }

    #[tokio::test]
    async fn already_all_values_short_circuits_without_mutation() {
        let page = MockPage::new();
        page.push_field(
            MockField::new("saw_1", Some("Região")).with_value(ALL_VALUES_OPTION_TEXT),
        );
        let timing = TimingProfile::instant();
        let target = field("saw_1", "Região");

        let first = configure_all_values(&page, &target, &timing).await.unwrap();
        let second = configure_all_values(&page, &target, &timing).await.unwrap();
        assert!(first.success && first.has_all_values);
        assert!(second.success && second.has_all_values);

        // No click or toggle ever happened: both invocations were reads.
        let calls = page.calls();
        assert!(
            calls.iter().all(|c| !c.starts_with("click") && !c.starts_with("toggle")),
            "unexpected mutating calls: {calls:?}"
        );
    }

    #[tokio::test]
    async fn attribute_marker_strategy_wins_first() {
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("Região")).with_options(vec![
            MockOption::new(ALL_VALUES_OPTION_TEXT).with_id("saw_1_All"),
            MockOption::new("Norte"),
        ]));

        let outcome = configure_all_values(&page, &field("saw_1", "Região"), &TimingProfile::instant())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.has_all_values);
        assert!(page.call_position("toggle saw_1:0").is_some());
        // The second option was never touched.
        assert!(page.call_position("toggle saw_1:1").is_none());
    }

    #[tokio::test]
    async fn first_option_fallback_applies_on_fresh_list() {
        // No attribute marker, no literal text: position 0 is trusted to be
        // the blanket entry.
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("Porte")).with_options(vec![
            MockOption::new("Todas as opções"),
            MockOption::new("Até 50 matrículas"),
        ]));

        let outcome = configure_all_values(&page, &field("saw_1", "Porte"), &TimingProfile::instant())
            .await
            .unwrap();
        assert!(outcome.success);
        // The first entry's text does not match the all-values pattern, so
        // verification reports the truth.
        assert!(!outcome.has_all_values);
        let configured = page.field("saw_1").unwrap();
        assert!(configured.options[0].checked);
    }

    #[tokio::test]
    async fn deselect_extras_collapses_multi_selection() {
        // Three entries selected, none of them the blanket text and the
        // list not fresh: only the last-resort strategy applies.
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("Localização")).with_options(vec![
            MockOption::new("Urbana").checked(),
            MockOption::new("Rural").checked(),
            MockOption::new("Outra").checked(),
        ]));

        let outcome =
            configure_all_values(&page, &field("saw_1", "Localização"), &TimingProfile::instant())
                .await
                .unwrap();
        assert!(outcome.success);
        assert!(!outcome.has_all_values);

        let configured = page.field("saw_1").unwrap();
        let checked: Vec<_> = configured.options.iter().filter(|o| o.checked).collect();
        assert_eq!(checked.len(), 1);
        assert_eq!(checked[0].text, "Urbana");
    }

    #[tokio::test]
    async fn collapsed_selection_reports_all_values_when_survivor_matches() {
        // Multi-selection where the first selected entry happens to be the
        // blanket text, but the collapsed display hides that until the list
        // is closed again.
        let page = MockPage::new();
        page.push_field(
            MockField::new("saw_1", Some("Categoria"))
                .with_options(vec![
                    MockOption::new(ALL_VALUES_OPTION_TEXT).checked(),
                    MockOption::new("Privada").checked(),
                    MockOption::new("Pública").checked(),
                ])
                .with_value("3 valores selecionados"),
        );

        let outcome =
            configure_all_values(&page, &field("saw_1", "Categoria"), &TimingProfile::instant())
                .await
                .unwrap();
        assert!(outcome.success);
        assert!(outcome.has_all_values);
        // The text strategy keeps the blanket entry selected; it does not
        // collapse the rest — that is the last-resort strategy's job.
        let configured = page.field("saw_1").unwrap();
        assert!(configured.options[0].checked);
    }

    #[tokio::test]
    async fn empty_list_exhausts_the_chain() {
        let page = MockPage::new();
        page.push_field(MockField::new("saw_1", Some("Etapa")));

        let outcome = configure_all_values(&page, &field("saw_1", "Etapa"), &TimingProfile::instant())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!outcome.has_all_values);
        assert!(outcome.skip.is_none());
    }

    #[tokio::test]
    async fn close_prefers_confirm_control_over_outside_click() {
        let page = MockPage::new();
        page.set_confirm_control(true);
        page.push_field(MockField::new("saw_1", Some("Região")).with_options(vec![
            MockOption::new(ALL_VALUES_OPTION_TEXT),
        ]));

        configure_all_values(&page, &field("saw_1", "Região"), &TimingProfile::instant())
            .await
            .unwrap();

        let calls = page.calls();
        assert!(calls.iter().any(|c| c == "confirm-close"));
        assert!(calls.iter().all(|c| c != "click_at"));
        // Selection survived the close.
        assert!(page.field("saw_1").unwrap().options[0].checked);
    }
}
