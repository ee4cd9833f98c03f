//! Parse model output into pipeline values
//!
//! Every parser is total over arbitrary text: malformed output becomes an
//! `Err` or a conservative default, never a panic.

use fermi_domain::Certainty;
use serde_json::Value;
use tracing::warn;

/// A direct estimate from the model
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PriorAnswer {
    pub value: f64,
    pub range: Option<(f64, f64)>,
    pub unit: Option<String>,
    pub certainty: Certainty,
    pub reasoning: String,
}

/// One variable of a proposed model
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VariableSpec {
    pub name: String,
    pub description: String,
    pub concept: Option<String>,
}

/// One proposed model
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModelSpec {
    pub id: String,
    pub formula: String,
    pub description: String,
    pub variables: Vec<VariableSpec>,
}

/// Direction of a fact relative to the target quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Relationship {
    UpperBound,
    LowerBound,
    Unrelated,
}

/// Extract the JSON object from a response, handling markdown code blocks
pub(crate) fn extract_json(response: &str) -> Result<&str, String> {
    let mut trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the fence line (```json or ```) and the closing fence
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        trimmed = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&trimmed[start..=end]),
        _ => Err("No JSON object in response".to_string()),
    }
}

fn parse_object(response: &str) -> Result<serde_json::Map<String, Value>, String> {
    let json_str = extract_json(response)?;
    let json: Value =
        serde_json::from_str(json_str).map_err(|e| format!("JSON parse error: {}", e))?;
    match json {
        Value::Object(obj) => Ok(obj),
        _ => Err("Expected JSON object".to_string()),
    }
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn string_from(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a direct estimate; value and certainty are required
pub(crate) fn parse_prior(response: &str) -> Result<PriorAnswer, String> {
    let obj = parse_object(response)?;

    let value = obj
        .get("value")
        .and_then(number_from)
        .ok_or_else(|| "Missing or invalid 'value'".to_string())?;

    let certainty: Certainty = obj
        .get("certainty")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Missing or invalid 'certainty'".to_string())?
        .parse()?;

    let range = obj
        .get("range")
        .and_then(|v| v.as_array())
        .and_then(|items| match items.as_slice() {
            [low, high] => number_from(low).zip(number_from(high)),
            _ => None,
        })
        .filter(|(low, high)| low <= high);

    Ok(PriorAnswer {
        value,
        range,
        unit: string_from(&obj, "unit"),
        certainty,
        reasoning: string_from(&obj, "reasoning").unwrap_or_default(),
    })
}

fn parse_variable(json: &Value) -> Option<VariableSpec> {
    match json {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty()).then(|| VariableSpec {
                name: name.to_string(),
                description: String::new(),
                concept: None,
            })
        }
        Value::Object(obj) => Some(VariableSpec {
            name: string_from(obj, "name")?,
            description: string_from(obj, "description").unwrap_or_default(),
            concept: string_from(obj, "concept"),
        }),
        _ => None,
    }
}

fn parse_model(json: &Value, idx: usize) -> Result<ModelSpec, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Model is not a JSON object".to_string())?;

    let formula = string_from(obj, "formula").ok_or_else(|| "Missing 'formula'".to_string())?;
    let variables: Vec<VariableSpec> = obj
        .get("variables")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(parse_variable).collect())
        .unwrap_or_default();
    if variables.is_empty() {
        return Err("Model has no variables".to_string());
    }

    Ok(ModelSpec {
        id: string_from(obj, "id").unwrap_or_else(|| format!("m{}", idx + 1)),
        formula,
        description: string_from(obj, "description").unwrap_or_default(),
        variables,
    })
}

/// Parse candidate models; malformed entries are skipped
pub(crate) fn parse_models(response: &str) -> Result<Vec<ModelSpec>, String> {
    let json_str = extract_json(response)?;
    let json: Value =
        serde_json::from_str(json_str).map_err(|e| format!("JSON parse error: {}", e))?;

    let items = match &json {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("models")
            .and_then(|v| v.as_array())
            .ok_or_else(|| "Missing 'models' array".to_string())?,
        _ => return Err("Expected JSON object or array".to_string()),
    };

    let mut models: Vec<ModelSpec> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        match parse_model(item, idx) {
            Ok(mut model) => {
                if models.iter().any(|m| m.id == model.id) {
                    model.id = format!("{}_{}", model.id, idx + 1);
                }
                models.push(model);
            }
            Err(e) => warn!("Failed to parse model {}: {}", idx, e),
        }
    }

    if models.is_empty() {
        return Err("No usable model in response".to_string());
    }
    Ok(models)
}

/// Relationship and reasoning; anything unparseable is `Unrelated`
pub(crate) fn parse_relationship(response: &str) -> (Relationship, String) {
    let Ok(obj) = parse_object(response) else {
        return (Relationship::Unrelated, String::new());
    };
    let relationship = match obj
        .get("relationship")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_uppercase())
        .as_deref()
    {
        Some("UPPER_BOUND") | Some("UPPER") => Relationship::UpperBound,
        Some("LOWER_BOUND") | Some("LOWER") => Relationship::LowerBound,
        _ => Relationship::Unrelated,
    };
    (relationship, string_from(&obj, "reasoning").unwrap_or_default())
}

/// Whether a bound is hard; anything unparseable is soft
pub(crate) fn parse_hardness(response: &str) -> (bool, String) {
    let Ok(obj) = parse_object(response) else {
        return (false, String::new());
    };
    let is_hard = match obj.get("is_hard") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "hard"),
        _ => false,
    };
    (is_hard, string_from(&obj, "reasoning").unwrap_or_default())
}

/// Hard violations and soft warnings from a plausibility review
pub(crate) fn parse_review(response: &str) -> Option<(Vec<String>, Vec<String>)> {
    let obj = parse_object(response).ok()?;
    let list = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };
    if !obj.contains_key("hard_violations") && !obj.contains_key("soft_warnings") {
        return None;
    }
    Some((list("hard_violations"), list("soft_warnings")))
}

/// First number in free text
///
/// Accepts thousands separators, exponents, a trailing `%` (divided by 100)
/// and a trailing magnitude word such as `million`.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let digit_at = |i: usize| chars.get(i).is_some_and(|c| c.is_ascii_digit());

    let start = (0..chars.len()).find(|&i| {
        chars[i].is_ascii_digit() || (matches!(chars[i], '-' | '.') && digit_at(i + 1))
    })?;

    let mut token = String::new();
    let mut j = start;
    if chars[j] == '-' {
        token.push('-');
        j += 1;
    }
    while j < chars.len() {
        let c = chars[j];
        if c.is_ascii_digit() {
            token.push(c);
        } else if c == ',' && digit_at(j + 1) {
            // thousands separator
        } else if c == '.' && digit_at(j + 1) && !token.contains(['.', 'e']) {
            token.push(c);
        } else if matches!(c, 'e' | 'E') && !token.contains('e') {
            if digit_at(j + 1) {
                token.push('e');
            } else if matches!(chars.get(j + 1), Some('-' | '+')) && digit_at(j + 2) {
                token.push('e');
                token.push(chars[j + 1]);
                j += 1;
            } else {
                break;
            }
        } else {
            break;
        }
        j += 1;
    }

    let mut value: f64 = token.parse().ok()?;
    let rest: String = chars[j..].iter().collect();
    let rest = rest.trim_start().to_lowercase();
    if rest.starts_with('%') {
        value /= 100.0;
    } else {
        for (word, scale) in [
            ("thousand", 1e3),
            ("million", 1e6),
            ("billion", 1e9),
            ("trillion", 1e12),
        ] {
            if rest.starts_with(word) {
                value *= scale;
                break;
            }
        }
    }
    value.is_finite().then_some(value)
}
