//! Default key derivation.
//!
//! `sample_job/foo/bar/1` for job type `SampleJob` and arguments
//! `("foo", "bar", 1)`. Identical inputs always produce identical keys;
//! throttling and debouncing coalesce on nothing else.

use serde_json::Value;

/// Join the snake-cased job type and each argument's string form with `/`.
pub fn derive(job_type: &str, args: &[Value]) -> String {
    let mut key = underscore(job_type);
    for arg in args {
        key.push('/');
        key.push_str(&arg_segment(arg));
    }
    key
}

/// Lower-snake-case a job type name. Module separators (`::`) become `/`.
///
/// `Billing::HTTPSyncJob` becomes `billing/http_sync_job`.
pub fn underscore(job_type: &str) -> String {
    let source = job_type.replace("::", "/");
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// String form of one argument: raw text for strings, empty for null,
/// compact JSON otherwise.
fn arg_segment(arg: &Value) -> String {
    match arg {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
