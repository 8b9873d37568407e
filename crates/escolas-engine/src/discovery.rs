//! Field discovery.
//!
//! A field is "dropdown-capable" when it renders the dropdown icon next to
//! its prompt input. Labels are inferred by an ordered list of DOM-shape
//! heuristics — the portal's markup is inconsistent, so the first non-empty
//! answer wins and fields with no answer are kept under a sentinel rather
//! than dropped. This pass is read-only.

use std::collections::HashSet;

use escolas_driver::{DriverResult, Page};
use tracing::{debug, trace};

use crate::types::{FilterField, UNLABELED};

pub const DROPDOWN_ICON_SELECTOR: &str = "img[id$='_dropdownIcon']";
pub const FIELD_INPUT_SELECTOR: &str = "input[id^='saw_']";
pub const FREE_TEXT_SELECTOR: &str = "input[id^='saw_'][type='text']";
const ICON_SUFFIX: &str = "_dropdownIcon";

/// Fields a healthy portal revision is expected to expose. Used for
/// diagnostics only; a missing entry is logged, never fatal.
pub const REQUIRED_FIELDS: &[&str] = &[
    "Região",
    "UF",
    "Município",
    "Situação Funcionamento",
    "Localização",
    "Localização Diferenciada",
    "Categoria Administrativa",
    "Dependência Administrativa",
    "Etapa e Modalidade de Ensino",
    "Porte da Escola (Matrículas)",
];

struct LabelHeuristic {
    name: &'static str,
    expression: fn(&str) -> String,
}

const LABEL_HEURISTICS: &[LabelHeuristic] = &[
    LabelHeuristic {
        name: "preceding-cell",
        expression: preceding_cell_js,
    },
    LabelHeuristic {
        name: "aria-label",
        expression: aria_label_js,
    },
    LabelHeuristic {
        name: "row-first-cell",
        expression: row_first_cell_js,
    },
    LabelHeuristic {
        name: "associated-label",
        expression: associated_label_js,
    },
];

fn preceding_cell_js(input_id: &str) -> String {
    format!(
        "(() => {{ const el = document.getElementById(\"{input_id}\"); if (!el) return null; \
         const box = el.closest('td, div.masterCustomDropDown, tr'); if (!box) return null; \
         const prev = box.previousElementSibling; \
         if (!prev || !prev.textContent) return null; \
         const text = prev.textContent.trim().replace(':', '').replace('.', ''); \
         return text.length > 0 ? text : null; }})()"
    )
}

fn aria_label_js(input_id: &str) -> String {
    format!(
        "(() => {{ const el = document.getElementById(\"{input_id}\"); if (!el) return null; \
         const box = el.closest('td, div.masterCustomDropDown, tr'); if (!box) return null; \
         const aria = box.querySelector(\"label[id*='aria_label']\"); \
         if (!aria || !aria.textContent) return null; \
         const match = aria.textContent.match(/([^:,]+):/); \
         return match ? match[1].trim() : null; }})()"
    )
}

fn row_first_cell_js(input_id: &str) -> String {
    format!(
        "(() => {{ const el = document.getElementById(\"{input_id}\"); if (!el) return null; \
         const row = el.closest('tr'); if (!row) return null; \
         const cell = row.querySelector('td:first-child'); \
         if (!cell || !cell.textContent) return null; \
         const text = cell.textContent.trim().replace(':', '').replace('.', ''); \
         return text.length > 0 ? text : null; }})()"
    )
}

fn associated_label_js(input_id: &str) -> String {
    format!(
        "(() => {{ const el = document.getElementById(\"{input_id}\"); if (!el) return null; \
         const label = document.querySelector('label[for=\"{input_id}\"]'); \
         if (!label || !label.textContent) return null; \
         const text = label.textContent.trim().replace(':', '').replace('.', ''); \
         return text.length > 0 ? text : null; }})()"
    )
}

/// First non-empty heuristic answer wins; `None` keeps the field with the
/// sentinel label.
pub async fn infer_label(page: &dyn Page, input_id: &str) -> DriverResult<Option<String>> {
    for heuristic in LABEL_HEURISTICS {
        let value = page.eval(&(heuristic.expression)(input_id)).await?;
        if let Some(text) = value.as_str() {
            let text = text.trim();
            if !text.is_empty() {
                trace!(heuristic = heuristic.name, label = text, "label inferred");
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}

/// Scan the rendered page for dropdown-capable fields, in document order.
/// Zero fields is a valid (degenerate) result.
pub async fn discover_fields(page: &dyn Page) -> DriverResult<Vec<FilterField>> {
    let icon_ids = page
        .query_attribute_all(DROPDOWN_ICON_SELECTOR, "id")
        .await?;

    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for icon_id in icon_ids {
        let Some(input_id) = icon_id.strip_suffix(ICON_SUFFIX) else {
            continue;
        };
        if !seen.insert(input_id.to_string()) {
            continue;
        }
        if !page.exists(&format!("#{input_id}")).await? {
            continue;
        }
        let label = infer_label(page, input_id).await?;
        debug!(
            field = label.as_deref().unwrap_or(UNLABELED),
            id = input_id,
            "dropdown-capable field found"
        );
        fields.push(FilterField {
            input_id: input_id.to_string(),
            icon_id,
            label,
        });
    }
    Ok(fields)
}

/// Reconcile discovered labels against [`REQUIRED_FIELDS`]. Unlabeled
/// fields never count towards the required set.
pub fn reconcile_required(fields: &[FilterField]) -> (Vec<&'static str>, Vec<&'static str>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for required in REQUIRED_FIELDS {
        let present = fields
            .iter()
            .filter_map(|field| field.label.as_deref())
            .any(|label| label.contains(required));
        if present {
            found.push(*required);
        } else {
            missing.push(*required);
        }
    }
    (found, missing)
}
