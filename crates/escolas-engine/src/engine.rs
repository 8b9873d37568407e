//! Run orchestration.
//!
//! One run walks the state machine
//! `Navigated → FieldsDiscovered → ConfiguringFields → FiltersApplied →
//! ExportTriggered → Captured`, failing over to `Failed` on any fatal
//! error. Fields are configured strictly one at a time, in discovery order:
//! configuring one field can change the visibility and enabled state of
//! later ones, so ordering is a correctness requirement.

use std::collections::{HashSet, VecDeque};

use escolas_driver::{ChromiumSession, Page, WaitState};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::deps::{dependency_rank, is_prerequisite, normalize_label, should_skip};
use crate::discovery::{
    FIELD_INPUT_SELECTOR, FREE_TEXT_SELECTOR, discover_fields, reconcile_required,
};
use crate::error::{EngineError, RunError};
use crate::export::capture_export;
use crate::selection::configure_all_values;
use crate::submit::{await_settle, submit_filters};
use crate::timing::TimingProfile;
use crate::types::{ConfiguredField, ExportArtifact, RunStage, SelectionOutcome};

pub struct ScrapeEngine {
    config: EngineConfig,
    timing: TimingProfile,
}

impl ScrapeEngine {
    pub fn new(config: EngineConfig) -> Self {
        let timing = config.timing_profile();
        Self { config, timing }
    }

    /// Override the timing profile (tests drive the mock with zero waits).
    pub fn with_timing(config: EngineConfig, timing: TimingProfile) -> Self {
        Self { config, timing }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One full run against a fresh browser session. The session is
    /// released on every exit path except an explicitly requested
    /// `keep_open` inspection run.
    pub async fn run_once(&self) -> Result<ExportArtifact, RunError> {
        self.config
            .validate()
            .map_err(|error| RunError::at(RunStage::Idle, error))?;

        let session = ChromiumSession::launch(self.config.launch_options())
            .await
            .map_err(|error| RunError::at(RunStage::Idle, error.into()))?;

        let result = self.drive(&session).await;

        let keep_open = self.config.keep_open && !self.config.headless;
        if keep_open {
            info!("leaving session open for inspection; release is now external");
        }
        if let Err(error) = session.close(keep_open).await {
            warn!(%error, "session release failed");
        }
        result
    }

    /// The run body, driven through the abstract page surface.
    pub async fn drive(&self, page: &dyn Page) -> Result<ExportArtifact, RunError> {
        let timing = &self.timing;
        info!(url = %self.config.portal_url, profile = timing.name, "starting scrape run");

        page.goto(&self.config.portal_url, timing.navigation_timeout)
            .await
            .map_err(|error| RunError::at(RunStage::Navigated, navigation_error(error)))?;
        let fields_visible = page
            .wait_for(
                FIELD_INPUT_SELECTOR,
                WaitState::Visible,
                timing.fields_visible_timeout,
            )
            .await
            .map_err(|error| RunError::at(RunStage::Navigated, error.into()))?;
        if !fields_visible {
            return Err(RunError::at(
                RunStage::Navigated,
                EngineError::NavigationTimeout,
            ));
        }
        tokio::time::sleep(timing.page_ready).await;
        self.debug_capture(page, "01-carregada").await;

        let mut initial = discover_fields(page)
            .await
            .map_err(|error| RunError::at(RunStage::FieldsDiscovered, error.into()))?;
        if initial.is_empty() {
            return Err(RunError::at(
                RunStage::FieldsDiscovered,
                EngineError::NoFieldsDiscovered,
            ));
        }
        let (found, missing) = reconcile_required(&initial);
        info!(
            total = initial.len(),
            required_found = found.len(),
            "fields discovered"
        );
        if !missing.is_empty() {
            warn!(?missing, "required fields absent from this portal revision");
        }

        // Prerequisites first; discovery order is preserved within a rank.
        initial.sort_by_key(|field| dependency_rank(field.display_label()));
        let mut queue: VecDeque<_> = initial.into();
        let mut attempted_ids: HashSet<String> = HashSet::new();
        let mut attempted_labels: HashSet<String> = HashSet::new();
        let mut configured: Vec<ConfiguredField> = Vec::new();
        let mut skipped = 0usize;

        while let Some(field) = queue.pop_front() {
            if !attempted_ids.insert(field.input_id.clone()) {
                continue;
            }
            let label = field.display_label().to_string();
            if field.label.is_some()
                && !attempted_labels.insert(normalize_label(&label).to_string())
            {
                debug!(field = %label, "label already attempted this run");
                continue;
            }

            let decision = should_skip(&label, &configured);
            if decision.skip {
                info!(
                    field = %label,
                    reason = decision.reason.as_deref().unwrap_or(""),
                    "skipping dependency-satisfied field"
                );
                skipped += 1;
                continue;
            }

            let outcome = match configure_all_values(page, &field, timing).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    // Per-field driver hiccups never abort the run.
                    warn!(field = %label, %error, "field configuration failed");
                    SelectionOutcome::failed()
                }
            };

            match outcome.skip {
                Some(reason) => {
                    info!(field = %label, ?reason, "field unavailable");
                    skipped += 1;
                }
                None if outcome.success => {
                    configured.push(ConfiguredField {
                        label: label.clone(),
                        has_all_values: outcome.has_all_values,
                    });
                    if outcome.has_all_values && is_prerequisite(&label) {
                        info!(field = %label, "prerequisite satisfied, re-scanning fields");
                        tokio::time::sleep(timing.dependent_refresh).await;
                        match discover_fields(page).await {
                            Ok(mut rescan) => {
                                rescan.sort_by_key(|fresh| {
                                    dependency_rank(fresh.display_label())
                                });
                                for fresh in rescan {
                                    if !attempted_ids.contains(&fresh.input_id) {
                                        queue.push_back(fresh);
                                    }
                                }
                            }
                            Err(error) => {
                                warn!(%error, "re-scan failed, continuing with known fields");
                            }
                        }
                    }
                }
                None => {
                    warn!(field = %label, "left unconfigured: selection strategies exhausted");
                }
            }
            tokio::time::sleep(timing.between_fields).await;
        }
        info!(
            configured = configured.len(),
            skipped, "field configuration finished"
        );

        if let Err(error) = self.clear_free_text_fields(page, &attempted_ids).await {
            warn!(%error, "free-text clearing failed, continuing");
        }
        self.debug_capture(page, "02-filtros").await;

        submit_filters(page)
            .await
            .map_err(|error| RunError::at(RunStage::FiltersApplied, error))?;
        match await_settle(page, timing).await {
            Ok(Some(count)) => info!(schools = count, "portal reports selection count"),
            Ok(None) => {}
            Err(error) => warn!(%error, "settle scrape failed"),
        }
        self.debug_capture(page, "03-aplicado").await;

        let artifact = capture_export(page, &self.config.staging_dir, timing)
            .await
            .map_err(|error| RunError::at(RunStage::ExportTriggered, error))?;
        info!(path = %artifact.path.display(), "run complete");
        Ok(artifact)
    }

    /// Free-text prompts (school name / INEP code) are not dropdown-backed;
    /// any leftover content in them would restrict the export.
    async fn clear_free_text_fields(
        &self,
        page: &dyn Page,
        dropdown_ids: &HashSet<String>,
    ) -> Result<(), EngineError> {
        let ids = page.query_attribute_all(FREE_TEXT_SELECTOR, "id").await?;
        for id in ids {
            if dropdown_ids.contains(&id) {
                continue;
            }
            let selector = format!("#{id}");
            if !page.is_visible(&selector).await? || !page.is_enabled(&selector).await? {
                continue;
            }
            let has_content = page
                .input_value(&selector)
                .await?
                .map(|value| !value.is_empty())
                .unwrap_or(false);
            if has_content {
                page.clear_input(&selector).await?;
                debug!(field = %id, "free-text field cleared");
            }
        }
        Ok(())
    }

    async fn debug_capture(&self, page: &dyn Page, name: &str) {
        if !self.config.debug_captures {
            return;
        }
        let path = self.config.staging_dir.join(format!("debug_{name}.png"));
        if let Err(error) = page.screenshot(&path).await {
            debug!(%error, "debug capture failed");
        }
    }
}

fn navigation_error(error: escolas_driver::DriverError) -> EngineError {
    match error {
        escolas_driver::DriverError::NavigationTimeout(_) => EngineError::NavigationTimeout,
        other => EngineError::Driver(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escolas_driver::mock::{
        ALL_VALUES_OPTION_TEXT, MockField, MockOption, MockPage, TriggerPresence,
    };

    fn engine_for(staging: &std::path::Path) -> ScrapeEngine {
        let config = EngineConfig {
            staging_dir: staging.to_path_buf(),
            ..EngineConfig::default()
        };
        ScrapeEngine::with_timing(config, TimingProfile::instant())
    }

    fn all_values_field(input_id: &str, label: &str) -> MockField {
        MockField::new(input_id, Some(label))
            .with_options(vec![MockOption::all_values(), MockOption::new("Norte")])
    }

    fn scripted_page(staging: &std::path::Path) -> MockPage {
        let delivered = staging.join("guid-e2e");
        std::fs::write(&delivered, b"Escola;UF\nA;SP\n").unwrap();
        let page = MockPage::new();
        page.set_apply(TriggerPresence::Css);
        page.set_export(TriggerPresence::Css);
        page.set_download(&delivered, 14);
        page
    }

    #[tokio::test]
    async fn happy_path_produces_an_artifact() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_1", "Situação Funcionamento"));

        let artifact = engine_for(staging.path()).drive(&page).await.unwrap();
        assert!(artifact.path.exists());
        assert!(
            artifact
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("catalogo_escolas_")
        );
    }

    #[tokio::test]
    async fn dependent_fields_are_skipped_after_prerequisite_reaches_all_values() {
        // Scenario: Região configured with all values → UF and Município
        // must be skipped with Região named as the reason, regardless of
        // their own state.
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_1", "Região"));
        page.push_field(all_values_field("saw_2", "UF"));
        page.push_field(all_values_field("saw_3", "Município"));

        engine_for(staging.path()).drive(&page).await.unwrap();

        // Região's list was touched; the dependent fields' lists were not.
        assert!(page.call_position("toggle saw_1:0").is_some());
        assert!(page.call_position("toggle saw_2:0").is_none());
        assert!(page.call_position("toggle saw_3:0").is_none());
        assert!(page.call_position("click #saw_2_dropdownIcon").is_none());
    }

    #[tokio::test]
    async fn dependency_order_holds_regardless_of_discovery_order() {
        // UF is discovered before Região, but the work queue puts the
        // prerequisite first; once Região reaches all values, UF is skipped
        // without ever being touched.
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_2", "UF"));
        page.push_field(all_values_field("saw_1", "Região"));

        engine_for(staging.path()).drive(&page).await.unwrap();

        assert!(page.call_position("toggle saw_1:0").is_some());
        assert!(page.call_position("click #saw_2_dropdownIcon").is_none());
        assert!(page.call_position("toggle saw_2:0").is_none());
    }

    #[tokio::test]
    async fn rescan_picks_up_fields_revealed_by_a_prerequisite() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_1", "Região"));
        page.reveal_on_rescan(all_values_field("saw_9", "Localização"));

        engine_for(staging.path()).drive(&page).await.unwrap();

        // The revealed field was configured after the re-scan.
        assert!(page.call_position("toggle saw_9:0").is_some());

        // Região came back from the re-scan too, but a field is attempted
        // at most once per run: its icon was clicked exactly twice (open
        // and close), never a third time.
        let regiao_clicks = page
            .calls()
            .iter()
            .filter(|c| *c == "click #saw_1_dropdownIcon")
            .count();
        assert_eq!(regiao_clicks, 2);
    }

    #[tokio::test]
    async fn unlabeled_fields_are_still_configured() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        let unlabeled = MockField::new("saw_7", None)
            .with_options(vec![MockOption::all_values(), MockOption::new("X")]);
        page.push_field(unlabeled);

        engine_for(staging.path()).drive(&page).await.unwrap();
        assert!(page.call_position("toggle saw_7:0").is_some());
    }

    #[tokio::test]
    async fn empty_page_times_out_waiting_for_fields() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());

        let error = engine_for(staging.path()).drive(&page).await.unwrap_err();
        assert_eq!(error.stage, RunStage::Navigated);
        assert!(matches!(error.source, EngineError::NavigationTimeout));
    }

    #[tokio::test]
    async fn page_without_dropdowns_surfaces_no_fields_found() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        // A free-text prompt renders, but nothing is dropdown-capable.
        let mut free_text = MockField::new("saw_8", None);
        free_text.icon_id.clear();
        page.push_field(free_text);

        let error = engine_for(staging.path()).drive(&page).await.unwrap_err();
        assert_eq!(error.stage, RunStage::FieldsDiscovered);
        assert!(matches!(error.source, EngineError::NoFieldsDiscovered));
    }

    #[tokio::test]
    async fn missing_apply_trigger_aborts_at_filters_applied() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_1", "Região"));
        page.set_apply(TriggerPresence::Absent);

        let error = engine_for(staging.path()).drive(&page).await.unwrap_err();
        assert_eq!(error.stage, RunStage::FiltersApplied);
        assert!(matches!(error.source, EngineError::SubmissionTriggerNotFound));
    }

    #[tokio::test]
    async fn missing_export_trigger_aborts_without_an_artifact() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        page.push_field(all_values_field("saw_1", "Região"));
        page.set_export(TriggerPresence::Absent);

        let error = engine_for(staging.path()).drive(&page).await.unwrap_err();
        assert_eq!(error.stage, RunStage::ExportTriggered);
        assert!(matches!(error.source, EngineError::ExportTriggerNotFound));

        // No artifact was produced.
        let produced = std::fs::read_dir(staging.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("catalogo_escolas_"))
            .count();
        assert_eq!(produced, 0);
    }

    #[tokio::test]
    async fn per_field_failures_do_not_abort_the_run() {
        let staging = tempfile::tempdir().unwrap();
        let page = scripted_page(staging.path());
        // Hidden and empty-list fields fail locally; the labeled good field
        // still carries the run to a capture.
        page.push_field(MockField::new("saw_1", Some("Localização")).hidden());
        page.push_field(MockField::new("saw_2", Some("Etapa")));
        page.push_field(all_values_field("saw_3", "Situação Funcionamento"));

        let artifact = engine_for(staging.path()).drive(&page).await.unwrap();
        assert!(artifact.path.exists());
    }
}
