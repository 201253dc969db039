// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Input validation for analytics requests
//!
//! Validation never fails fast: every problem in the payload is collected
//! into a [`ValidationErrors`] map keyed by field, nested fields using dotted
//! paths (`date_range.from_date`). The caller decides how to report it.

use chrono::NaiveDate;
use lettre::Address;
use retailpivot_core::DateRange;
use retailpivot_query::{has_comparison_suffix, AnalyticsQuery};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const REQUIRED: &str = "This field is required.";
const EXPECTED_LIST: &str = "Expected a list of strings.";
const INVALID_DATE: &str = "Enter a valid date in YYYY-MM-DD format.";

/// Field name to error messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// How the result is delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderType {
    #[default]
    Json,
    Excel,
    Chart,
}

impl RenderType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "json" => Some(RenderType::Json),
            "excel" => Some(RenderType::Excel),
            "chart" => Some(RenderType::Chart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    #[default]
    #[serde(rename = "Bar Chart")]
    Bar,
    #[serde(rename = "Line Chart")]
    Line,
    #[serde(rename = "Pie Chart")]
    Pie,
}

impl ChartType {
    pub const ALL: [ChartType; 3] = [ChartType::Bar, ChartType::Line, ChartType::Pie];

    pub fn name(self) -> &'static str {
        match self {
            ChartType::Bar => "Bar Chart",
            ChartType::Line => "Line Chart",
            ChartType::Pie => "Pie Chart",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRequest {
    pub query: AnalyticsQuery,
    pub render_type: RenderType,
    pub chart_type: ChartType,
    pub email: Option<String>,
}

impl AnalyticsRequest {
    /// Served in the background and delivered by email
    pub fn is_async(&self) -> bool {
        match self.render_type {
            RenderType::Json => false,
            RenderType::Excel => true,
            RenderType::Chart => self.email.is_some(),
        }
    }
}

/// Field present and not `null`
fn field<'a>(body: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    body.get(name).filter(|v| !v.is_null())
}

fn string_list(body: &Map<String, Value>, name: &str, errors: &mut ValidationErrors) -> Vec<String> {
    match field(body, name) {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let names: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect();
            if names.len() != items.len() {
                errors.add(name, EXPECTED_LIST);
            }
            names
        }
        Some(_) => {
            errors.add(name, EXPECTED_LIST);
            Vec::new()
        }
    }
}

fn date_field(range: &Map<String, Value>, path: &str, name: &str, errors: &mut ValidationErrors) -> Option<NaiveDate> {
    let key = format!("{}.{}", path, name);
    match range.get(name).and_then(Value::as_str) {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                errors.add(key, INVALID_DATE);
                None
            }
        },
        None if range.get(name).map_or(true, Value::is_null) => {
            errors.add(key, REQUIRED);
            None
        }
        None => {
            errors.add(key, INVALID_DATE);
            None
        }
    }
}

fn date_range(body: &Map<String, Value>, path: &str, errors: &mut ValidationErrors) -> Option<DateRange> {
    let range = match field(body, path)? {
        Value::Object(range) => range,
        _ => {
            errors.add(path, "Expected an object with from_date and to_date.");
            return None;
        }
    };

    let from_date = date_field(range, path, "from_date", errors);
    let to_date = date_field(range, path, "to_date", errors);
    let (from_date, to_date) = (from_date?, to_date?);

    match DateRange::new(from_date, to_date) {
        Ok(range) => Some(range),
        Err(_) => {
            errors.add(path, "from_date must not be after to_date.");
            None
        }
    }
}

/// Normalised address when the mailer will accept it
fn parse_email(email: &str) -> Option<String> {
    email.trim().parse::<Address>().ok().map(|address| address.to_string())
}

/// Validate a raw `get-analytics` payload
pub fn validate_request(payload: &Value) -> Result<AnalyticsRequest, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let body = match payload.as_object() {
        Some(body) => body,
        None => {
            errors.add("non_field_errors", "Expected a JSON object.");
            return Err(errors);
        }
    };

    let metrics = string_list(body, "metrics", &mut errors);
    let dimensions = string_list(body, "group_by", &mut errors);

    let current = if field(body, "date_range").is_none() {
        errors.add("date_range", REQUIRED);
        None
    } else {
        date_range(body, "date_range", &mut errors)
    };
    let previous = date_range(body, "prev_date_range", &mut errors);

    if previous.is_none()
        && !errors.contains("prev_date_range")
        && metrics.iter().any(|m| has_comparison_suffix(m))
    {
        errors.add("prev_date_range", REQUIRED);
    }

    let total = match field(body, "total") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            errors.add("total", "Must be a valid boolean.");
            false
        }
    };

    let render_type = match field(body, "render_type") {
        None => RenderType::default(),
        Some(value) => match value.as_str().and_then(RenderType::parse) {
            Some(render_type) => render_type,
            None => {
                errors.add("render_type", format!("{} is not a valid choice.", value));
                RenderType::default()
            }
        },
    };

    let chart_type = match field(body, "chart_type") {
        None => ChartType::default(),
        Some(value) => match value.as_str().and_then(ChartType::parse) {
            Some(chart_type) => chart_type,
            None => {
                errors.add("chart_type", format!("{} is not a valid choice.", value));
                ChartType::default()
            }
        },
    };

    let email = match field(body, "email") {
        None => None,
        Some(Value::String(email)) if email.trim().is_empty() => None,
        Some(Value::String(email)) => match parse_email(email) {
            Some(address) => Some(address),
            None => {
                errors.add("email", "Enter a valid email address.");
                None
            }
        },
        Some(_) => {
            errors.add("email", "Enter a valid email address.");
            None
        }
    };

    if render_type == RenderType::Excel && email.is_none() && !errors.contains("email") {
        errors.add("email", "This field is required for excel reports.");
    }

    match current {
        Some(date_range) if errors.is_empty() => Ok(AnalyticsRequest {
            query: AnalyticsQuery {
                dimensions,
                metrics,
                date_range,
                prev_date_range: previous,
                total,
            },
            render_type,
            chart_type,
            email,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "metrics": ["turnover", "profit"],
            "group_by": ["shop_name"],
            "date_range": {"from_date": "2024-03-01", "to_date": "2024-03-31"}
        })
    }

    fn with(mut payload: Value, key: &str, value: Value) -> Value {
        payload[key] = value;
        payload
    }

    #[test]
    fn test_minimal_request() {
        let request = validate_request(&base()).unwrap();
        assert_eq!(request.query.metrics, vec!["turnover", "profit"]);
        assert_eq!(request.query.dimensions, vec!["shop_name"]);
        assert!(!request.query.total);
        assert_eq!(request.render_type, RenderType::Json);
        assert_eq!(request.chart_type, ChartType::Bar);
        assert!(!request.is_async());
    }

    #[test]
    fn test_comparison_metric_requires_previous_range() {
        let payload = with(base(), "metrics", json!(["turnover_diff"]));
        let errors = validate_request(&payload).unwrap_err();
        assert_eq!(errors.get("prev_date_range"), Some(&[REQUIRED.to_string()][..]));

        let payload = with(
            payload,
            "prev_date_range",
            json!({"from_date": "2024-02-01", "to_date": "2024-02-29"}),
        );
        let request = validate_request(&payload).unwrap();
        assert!(request.query.prev_date_range.is_some());
    }

    #[test]
    fn test_unknown_base_with_suffix_still_needs_previous_range() {
        let payload = with(base(), "metrics", json!(["bogus_prev"]));
        assert!(validate_request(&payload).unwrap_err().contains("prev_date_range"));
    }

    #[test]
    fn test_date_errors_use_dotted_paths() {
        let payload = with(
            base(),
            "date_range",
            json!({"from_date": "03/01/2024"}),
        );
        let errors = validate_request(&payload).unwrap_err();
        assert_eq!(errors.get("date_range.from_date"), Some(&[INVALID_DATE.to_string()][..]));
        assert_eq!(errors.get("date_range.to_date"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn test_inverted_range() {
        let payload = with(
            base(),
            "date_range",
            json!({"from_date": "2024-03-31", "to_date": "2024-03-01"}),
        );
        let errors = validate_request(&payload).unwrap_err();
        assert!(errors.contains("date_range"));
    }

    #[test]
    fn test_missing_date_range() {
        let payload = json!({"metrics": ["turnover"]});
        let errors = validate_request(&payload).unwrap_err();
        assert_eq!(errors.get("date_range"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn test_lists_must_hold_strings() {
        let payload = with(base(), "metrics", json!("turnover"));
        let payload = with(payload, "group_by", json!(["shop_name", 3]));
        let errors = validate_request(&payload).unwrap_err();
        assert!(errors.contains("metrics"));
        assert!(errors.contains("group_by"));
    }

    #[test]
    fn test_excel_requires_email() {
        let payload = with(base(), "render_type", json!("excel"));
        let errors = validate_request(&payload).unwrap_err();
        assert!(errors.contains("email"));

        let payload = with(payload, "email", json!("analyst@example.com"));
        let request = validate_request(&payload).unwrap();
        assert_eq!(request.render_type, RenderType::Excel);
        assert!(request.is_async());
    }

    #[test]
    fn test_chart_with_email_is_async() {
        let payload = with(base(), "render_type", json!("chart"));
        let payload = with(payload, "chart_type", json!("Pie Chart"));
        let request = validate_request(&payload).unwrap();
        assert_eq!(request.chart_type, ChartType::Pie);
        assert!(!request.is_async());

        let request = validate_request(&with(payload, "email", json!("a@b.co"))).unwrap();
        assert!(request.is_async());
    }

    #[test]
    fn test_bad_choices_and_types() {
        let payload = with(base(), "render_type", json!("pdf"));
        let payload = with(payload, "chart_type", json!("Radar Chart"));
        let payload = with(payload, "total", json!("yes"));
        let payload = with(payload, "email", json!("not-an-email"));
        let errors = validate_request(&payload).unwrap_err();

        for field in ["chart_type", "email", "render_type", "total"] {
            assert!(errors.contains(field), "missing error for {}", field);
        }
        assert!(!errors.contains("metrics"));
    }

    #[test]
    fn test_non_object_payload() {
        let errors = validate_request(&json!([1, 2])).unwrap_err();
        assert!(errors.contains("non_field_errors"));
    }

    #[test]
    fn test_errors_serialize_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("prev_date_range", REQUIRED);
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({"prev_date_range": ["This field is required."]})
        );
    }

    #[test]
    fn test_email_shapes() {
        assert_eq!(parse_email(" a@b.co "), Some("a@b.co".to_string()));
        assert_eq!(parse_email("@b.co"), None);
        assert_eq!(parse_email("a b@c.de"), None);
        assert_eq!(parse_email("a@@b.co"), None);
        assert_eq!(parse_email("a,b@example..com"), None);
        assert_eq!(parse_email("a<b>@example.com"), None);
    }

    #[test]
    fn test_unsendable_address_rejected_before_queueing() {
        let payload = with(base(), "render_type", json!("excel"));
        for address in ["a,b@example..com", "a<b>@example.com"] {
            let errors = validate_request(&with(payload.clone(), "email", json!(address))).unwrap_err();
            assert_eq!(
                errors.get("email"),
                Some(&["Enter a valid email address.".to_string()][..])
            );
        }
    }
}
