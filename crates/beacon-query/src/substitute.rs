use beacon_types::{Bindings, PlaceholderDecl, WidgetDefinition, WidgetError, WidgetResult};
use serde_json::Value;

/// A query template after placeholder substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub name: String,
    pub alias: String,
    pub body: Value,
    pub branch_name_filter: bool,
    pub is_past: bool,
}

/// Replaces every `$name` sigil in `template` with its binding.
///
/// Identifiers are `[A-Za-z0-9_]+`, matched greedily. A JSON string that is
/// exactly one placeholder is replaced by the value's JSON form, so lists
/// become arrays and integers stay bare; a placeholder embedded in longer
/// string content is interpolated as escaped text. A `$` not followed by an
/// identifier is copied through.
pub fn substitute(template: &str, bindings: &Bindings) -> WidgetResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut in_string = false;
    let mut escaped = false;
    // Input offset just past the opening quote, output offset of the quote.
    let mut string_open = (0_usize, 0_usize);
    let mut skip_until = 0_usize;

    for (index, ch) in template.char_indices() {
        if index < skip_until {
            continue;
        }
        if in_string && escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        match ch {
            '\\' if in_string => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                if !in_string {
                    string_open = (index + 1, out.len());
                }
                in_string = !in_string;
                out.push(ch);
            }
            '$' => {
                let end = identifier_end(template, index + 1);
                if end == index + 1 {
                    out.push(ch);
                    continue;
                }
                let name = &template[index + 1..end];
                let value = bindings
                    .get(name)
                    .ok_or_else(|| WidgetError::PlaceholderUnbound {
                        name: name.to_string(),
                    })?;
                skip_until = end;

                if !in_string {
                    out.push_str(&value.to_json_text());
                } else if string_open.0 == index && template[end..].starts_with('"') {
                    out.truncate(string_open.1);
                    out.push_str(&value.to_json_text());
                    in_string = false;
                    skip_until = end + 1;
                } else {
                    let quoted = Value::String(value.to_inline_text()).to_string();
                    out.push_str(&quoted[1..quoted.len() - 1]);
                }
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

fn identifier_end(text: &str, start: usize) -> usize {
    start
        + text[start..]
            .bytes()
            .take_while(|byte| byte.is_ascii_alphanumeric() || *byte == b'_')
            .count()
}

/// Type-checks bound placeholders and rejects missing required ones.
pub fn check_declared(declarations: &[PlaceholderDecl], bindings: &Bindings) -> WidgetResult<()> {
    for declaration in declarations {
        match bindings.get(&declaration.name) {
            Some(value) => declaration.kind.check(&declaration.name, value)?,
            None if declaration.required => {
                return Err(WidgetError::PlaceholderUnbound {
                    name: declaration.name.clone(),
                })
            }
            None => {}
        }
    }
    Ok(())
}

/// Renders the current and past query templates of `definition`.
///
/// `bindings` should already carry the derived period bindings.
pub fn render_queries(
    definition: &WidgetDefinition,
    bindings: &Bindings,
) -> WidgetResult<Vec<RenderedQuery>> {
    check_declared(&definition.placeholders, bindings)?;

    let current = definition.queries.iter().map(|entry| (entry, false));
    let past = definition.past_queries.iter().map(|entry| (entry, true));
    current
        .chain(past)
        .map(|((name, template), is_past)| {
            let rendered = substitute(&template.template_text(), bindings)?;
            let body = serde_json::from_str(&rendered).map_err(|_| {
                WidgetError::QueryTemplateInvalid {
                    query: name.clone(),
                }
            })?;
            Ok(RenderedQuery {
                name: name.clone(),
                alias: template.alias.clone(),
                body,
                branch_name_filter: template.branch_name_filter,
                is_past,
            })
        })
        .collect()
}
