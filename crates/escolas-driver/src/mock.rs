//! Scripted in-memory [`Page`] for engine tests.
//!
//! Models just enough of the portal surface: dropdown-capable fields with a
//! value list, an apply trigger, an export trigger and a download slot. Every
//! interaction is appended to a call log so tests can assert ordering (for
//! example that the download listener is armed before the export trigger is
//! clicked).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DriverError, DriverResult};
use crate::page::{DownloadEvent, Page, ValueOption, WaitState};

pub const ALL_VALUES_OPTION_TEXT: &str = "(Todos os Valores de Colunas)";

#[derive(Debug, Clone)]
pub struct MockOption {
    pub id: String,
    pub value: String,
    pub text: String,
    pub checked: bool,
}

impl MockOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            value: String::new(),
            text: text.into(),
            checked: false,
        }
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The blanket option as the portal renders it.
    pub fn all_values() -> Self {
        Self::new(ALL_VALUES_OPTION_TEXT)
    }
}

#[derive(Debug, Clone)]
pub struct MockField {
    pub input_id: String,
    pub icon_id: String,
    pub label: Option<String>,
    /// Index of the label heuristic that resolves this field's label
    /// (0 = preceding cell, 1 = aria label, 2 = row first cell,
    /// 3 = associated label element).
    pub label_heuristic: usize,
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
    pub value: String,
    pub options: Vec<MockOption>,
    pub open: bool,
}

impl MockField {
    pub fn new(input_id: impl Into<String>, label: Option<&str>) -> Self {
        let input_id = input_id.into();
        Self {
            icon_id: format!("{input_id}_dropdownIcon"),
            input_id,
            label: label.map(str::to_string),
            label_heuristic: 0,
            attached: true,
            visible: true,
            enabled: true,
            value: String::new(),
            options: Vec::new(),
            open: false,
        }
    }

    pub fn with_options(mut self, options: Vec<MockOption>) -> Self {
        self.options = options;
        self.recompute_value();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    fn recompute_value(&mut self) {
        self.value = self
            .options
            .iter()
            .filter(|o| o.checked)
            .map(|o| o.text.as_str())
            .collect::<Vec<_>>()
            .join("; ");
    }
}

/// How a trigger can be located on the mock surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPresence {
    /// Not present at all; every strategy misses.
    Absent,
    /// Reachable through the selector chain.
    Css,
    /// Only reachable through the manual text scan.
    TextOnly,
}

struct MockState {
    url: Option<String>,
    fields: Vec<MockField>,
    /// Fields that only appear from the second discovery scan onwards,
    /// mimicking the portal re-rendering after a prerequisite selection.
    revealed_on_rescan: Vec<MockField>,
    discovery_scans: usize,
    apply: TriggerPresence,
    export: TriggerPresence,
    confirm_control: bool,
    body_text: String,
    armed: bool,
    export_clicked: bool,
    export_armed_in_time: bool,
    download: Option<(PathBuf, u64)>,
    calls: Vec<String>,
}

pub struct MockPage {
    state: Mutex<MockState>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                url: None,
                fields: Vec::new(),
                revealed_on_rescan: Vec::new(),
                discovery_scans: 0,
                apply: TriggerPresence::Css,
                export: TriggerPresence::Css,
                confirm_control: false,
                body_text: String::new(),
                armed: false,
                export_clicked: false,
                export_armed_in_time: false,
                download: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn push_field(&self, field: MockField) {
        self.lock().fields.push(field);
    }

    pub fn reveal_on_rescan(&self, field: MockField) {
        self.lock().revealed_on_rescan.push(field);
    }

    pub fn set_apply(&self, presence: TriggerPresence) {
        self.lock().apply = presence;
    }

    pub fn set_export(&self, presence: TriggerPresence) {
        self.lock().export = presence;
    }

    pub fn set_confirm_control(&self, present: bool) {
        self.lock().confirm_control = present;
    }

    pub fn set_body_text(&self, text: impl Into<String>) {
        self.lock().body_text = text.into();
    }

    /// Provide the file the mock "browser" delivers when the export is
    /// triggered after arming.
    pub fn set_download(&self, path: impl Into<PathBuf>, bytes: u64) {
        self.lock().download = Some((path.into(), bytes));
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_position(&self, entry: &str) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == entry)
    }

    pub fn field(&self, input_id: &str) -> Option<MockField> {
        self.lock()
            .fields
            .iter()
            .find(|f| f.input_id == input_id)
            .cloned()
    }

    pub fn visited_url(&self) -> Option<String> {
        self.lock().url.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    fn log(&self, entry: impl Into<String>) {
        self.lock().calls.push(entry.into());
    }
}

fn id_selector(selector: &str) -> Option<&str> {
    selector.strip_prefix('#')
}

/// Extract the element id a label-heuristic snippet targets.
fn eval_target_id(expression: &str) -> Option<&str> {
    let start = expression.find("getElementById(\"")? + "getElementById(\"".len();
    let rest = &expression[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn heuristic_index(expression: &str) -> Option<usize> {
    if expression.contains("previousElementSibling") {
        Some(0)
    } else if expression.contains("aria_label") {
        Some(1)
    } else if expression.contains("closest('tr')") {
        Some(2)
    } else if expression.contains("label[for=") {
        Some(3)
    } else {
        None
    }
}

const APPLY_CSS_MARKERS: &[&str] = &["Aplicar", "gobtn", "promptApplyButton", "apply"];
const EXPORT_CSS_MARKERS: &[&str] = &["Download(", "Format=csv", "Extension=.csv", "Export", "export"];

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.lock().url = Some(url.to_string());
        self.log(format!("goto {url}"));
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        _timeout: Duration,
    ) -> DriverResult<bool> {
        // The mock surface never changes while waiting; evaluate once.
        let satisfied = match state {
            WaitState::Attached => self.exists(selector).await?,
            WaitState::Visible => self.is_visible(selector).await?,
            WaitState::Hidden => !self.is_visible(selector).await?,
        };
        Ok(satisfied)
    }

    async fn query_attribute_all(
        &self,
        selector: &str,
        _attribute: &str,
    ) -> DriverResult<Vec<String>> {
        let mut state = self.lock();
        if selector.contains("_dropdownIcon") {
            state.discovery_scans += 1;
            if state.discovery_scans >= 2 && !state.revealed_on_rescan.is_empty() {
                let revealed = std::mem::take(&mut state.revealed_on_rescan);
                state.fields.extend(revealed);
            }
            return Ok(state
                .fields
                .iter()
                .filter(|f| f.attached && !f.icon_id.is_empty())
                .map(|f| f.icon_id.clone())
                .collect());
        }
        if selector.contains("type='text'") || selector.contains("type=\"text\"") {
            return Ok(state
                .fields
                .iter()
                .filter(|f| f.attached)
                .map(|f| f.input_id.clone())
                .collect());
        }
        Ok(Vec::new())
    }

    async fn exists(&self, selector: &str) -> DriverResult<bool> {
        let state = self.lock();
        if let Some(id) = id_selector(selector) {
            return Ok(state
                .fields
                .iter()
                .any(|f| f.attached && (f.input_id == id || f.icon_id == id)));
        }
        if selector.contains("DropDownValueList") {
            return Ok(state.fields.iter().any(|f| f.open));
        }
        if selector.contains("saw_") {
            return Ok(state.fields.iter().any(|f| f.attached));
        }
        Ok(false)
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        let state = self.lock();
        if let Some(id) = id_selector(selector) {
            return Ok(state
                .fields
                .iter()
                .any(|f| f.attached && f.visible && (f.input_id == id || f.icon_id == id)));
        }
        if selector.contains("DropDownValueList") {
            return Ok(state.fields.iter().any(|f| f.open));
        }
        if selector.contains("saw_") {
            return Ok(state.fields.iter().any(|f| f.attached && f.visible));
        }
        Ok(false)
    }

    async fn is_enabled(&self, selector: &str) -> DriverResult<bool> {
        let state = self.lock();
        if let Some(id) = id_selector(selector) {
            return Ok(state
                .fields
                .iter()
                .any(|f| f.attached && f.enabled && (f.input_id == id || f.icon_id == id)));
        }
        Ok(true)
    }

    async fn input_value(&self, selector: &str) -> DriverResult<Option<String>> {
        let state = self.lock();
        let Some(id) = id_selector(selector) else {
            return Ok(None);
        };
        Ok(state
            .fields
            .iter()
            .find(|f| f.attached && f.input_id == id)
            .map(|f| f.value.clone()))
    }

    async fn clear_input(&self, selector: &str) -> DriverResult<()> {
        let mut state = self.lock();
        if let Some(id) = id_selector(selector)
            && let Some(field) = state.fields.iter_mut().find(|f| f.input_id == id)
        {
            field.value.clear();
        }
        drop(state);
        self.log(format!("clear {selector}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<bool> {
        let mut state = self.lock();
        if let Some(id) = id_selector(selector) {
            let clicked = if let Some(field) = state
                .fields
                .iter_mut()
                .find(|f| f.attached && f.visible && f.icon_id == id)
            {
                field.open = !field.open;
                if !field.open {
                    // Closing syncs the displayed value, like the portal does.
                    field.recompute_value();
                }
                true
            } else {
                false
            };
            if clicked {
                drop(state);
                self.log(format!("click {selector}"));
                return Ok(true);
            }
        }
        if EXPORT_CSS_MARKERS.iter().any(|m| selector.contains(m))
            && state.export == TriggerPresence::Css
        {
            state.export_clicked = true;
            state.export_armed_in_time = state.armed;
            drop(state);
            self.log("click export");
            return Ok(true);
        }
        if APPLY_CSS_MARKERS.iter().any(|m| selector.contains(m))
            && state.apply == TriggerPresence::Css
        {
            drop(state);
            self.log("click apply");
            return Ok(true);
        }
        Ok(false)
    }

    async fn click_at(&self, _x: f64, _y: f64) -> DriverResult<()> {
        let mut state = self.lock();
        for field in &mut state.fields {
            if field.open {
                field.open = false;
                field.recompute_value();
            }
        }
        drop(state);
        self.log("click_at");
        Ok(())
    }

    async fn click_text(&self, _tags: &[&str], text: &str, _exact: bool) -> DriverResult<bool> {
        let mut state = self.lock();
        let list_open = state.fields.iter().any(|f| f.open);
        if list_open && (text == "OK" || text == "Aplicar") {
            if !state.confirm_control {
                return Ok(false);
            }
            for field in &mut state.fields {
                if field.open {
                    field.open = false;
                    field.recompute_value();
                }
            }
            drop(state);
            self.log("confirm-close");
            return Ok(true);
        }
        if text == "Aplicar" && state.apply != TriggerPresence::Absent {
            drop(state);
            self.log("click apply");
            return Ok(true);
        }
        if matches!(text, "Exportar" | "Export" | "Download")
            && state.export != TriggerPresence::Absent
        {
            state.export_clicked = true;
            state.export_armed_in_time = state.armed;
            drop(state);
            self.log("click export");
            return Ok(true);
        }
        Ok(false)
    }

    async fn body_text(&self) -> DriverResult<String> {
        Ok(self.lock().body_text.clone())
    }

    async fn list_options(&self, _list_selector: &str) -> DriverResult<Vec<ValueOption>> {
        let state = self.lock();
        let Some(field) = state.fields.iter().find(|f| f.open) else {
            return Ok(Vec::new());
        };
        Ok(field
            .options
            .iter()
            .enumerate()
            .map(|(index, option)| ValueOption {
                index,
                id: option.id.clone(),
                value: option.value.clone(),
                text: option.text.clone(),
                checked: option.checked,
            })
            .collect())
    }

    async fn toggle_option(&self, _list_selector: &str, index: usize) -> DriverResult<bool> {
        let mut state = self.lock();
        let Some(field) = state.fields.iter_mut().find(|f| f.open) else {
            return Ok(false);
        };
        let input_id = field.input_id.clone();
        let Some(option) = field.options.get_mut(index) else {
            return Ok(false);
        };
        option.checked = !option.checked;
        let new_state = option.checked;
        field.recompute_value();
        drop(state);
        self.log(format!("toggle {input_id}:{index}"));
        Ok(new_state)
    }

    async fn eval(&self, expression: &str) -> DriverResult<Value> {
        let state = self.lock();
        if let (Some(target), Some(index)) =
            (eval_target_id(expression), heuristic_index(expression))
        {
            let label = state
                .fields
                .iter()
                .find(|f| f.input_id == target && f.label_heuristic == index)
                .and_then(|f| f.label.clone());
            return Ok(label.map(Value::String).unwrap_or(Value::Null));
        }
        Ok(Value::Null)
    }

    async fn arm_download(&self) -> DriverResult<()> {
        self.lock().armed = true;
        self.log("arm_download");
        Ok(())
    }

    async fn wait_for_download(&self, timeout: Duration) -> DriverResult<DownloadEvent> {
        let state = self.lock();
        if state.export_clicked && state.export_armed_in_time {
            if let Some((path, bytes)) = state.download.clone() {
                return Ok(DownloadEvent { path, bytes });
            }
        }
        Err(DriverError::DownloadTimeout(timeout))
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.log(format!("screenshot {}", path.display()));
        Ok(())
    }
}
