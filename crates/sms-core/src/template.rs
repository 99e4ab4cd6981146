//! Template filling and recipient validation shared by the adapters.

use crate::{SmsError, TemplateParams};

/// Parameter most verification-code templates are filled with.
pub const CODE: &str = "code";

/// Fetch the `code` parameter, rejecting requests that don't carry one.
pub fn require_code(params: &TemplateParams) -> Result<&str, SmsError> {
    params
        .get(CODE)
        .map(String::as_str)
        .ok_or_else(|| SmsError::Invalid("missing parameter: code".into()))
}

/// Reject an empty recipient list.
pub fn require_targets<'a>(to: &'a [&'a str]) -> Result<&'a [&'a str], SmsError> {
    if to.is_empty() {
        return Err(SmsError::Invalid(
            "missing parameter: targetPhoneNumber".into(),
        ));
    }
    Ok(to)
}

/// Fill a printf-style template with the verification code.
///
/// The first `%s` is replaced. An empty template yields the code alone and a
/// template without `%s` gets the code appended.
pub fn fill_code(template: &str, code: &str) -> String {
    if template.is_empty() {
        return code.to_string();
    }
    match template.find("%s") {
        Some(idx) => format!("{}{}{}", &template[..idx], code, &template[idx + 2..]),
        None => format!("{}{}", template, code),
    }
}

/// Collect positional parameters `"0"`, `"1"`, ... stopping at the first missing or empty one.
pub fn positional(params: &TemplateParams) -> Vec<String> {
    (0..)
        .map(|i: usize| params.get(&i.to_string()))
        .take_while(|v| v.is_some_and(|s| !s.is_empty()))
        .flatten()
        .cloned()
        .collect()
}

/// Replace every `{key}` placeholder with the matching parameter value.
pub fn substitute(template: &str, params: &TemplateParams) -> String {
    params.iter().fold(template.to_string(), |acc, (k, v)| {
        acc.replace(&format!("{{{}}}", k), v)
    })
}

/// Drop a leading `+` from an E.164 number.
pub fn strip_plus(number: &str) -> &str {
    number.strip_prefix('+').unwrap_or(number)
}

/// Comma-join recipients the way most bulk APIs expect them.
pub fn join_numbers(to: &[&str]) -> String {
    to.join(",")
}
