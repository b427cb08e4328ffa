//! Discovery query templates.

use chrono::NaiveDate;

/// Tickets assigned to the caller and in progress on the target day.
/// `{0}` is replaced with the day as `YYYY/MM/DD`.
pub const DEFAULT_QUERY: &str =
    r#"assignee was currentUser() ON "{0}" AND status was "In Progress" ON "{0}""#;

/// Replace `{0}`, `{1}`, ... in `template` with the positional `args`.
///
/// Placeholders without a matching argument, and braces that do not form a
/// placeholder, are copied through unchanged.
pub fn substitute(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg, close))
        });
        match replaced {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the discovery query for `day`, using `template` when given.
pub fn for_day(template: Option<&str>, day: NaiveDate) -> String {
    let date = day.format("%Y/%m/%d").to_string();
    substitute(template.unwrap_or(DEFAULT_QUERY), &[&date])
}
