//! Hyperlinks attached to frames and blocks.
//!
//! A template is a URL with `{procedure_id}` and `{block_id}` placeholders; `{{` and `}}`
//! stand for literal braces. Templates copied out of a browser often arrive with the braces
//! percent-encoded, so `%7B`/`%7D` are decoded first.

use crate::meta::Role;
use crate::scene::Scene;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTemplates {
    /// Link for procedure frames.
    pub procedure: Option<String>,
    /// Link for blocks and their labels.
    pub block: Option<String>,
}

impl LinkTemplates {
    pub fn is_empty(&self) -> bool {
        self.procedure.is_none() && self.block.is_none()
    }

    /// Sets `link` on every frame, block and block label the templates resolve for.
    /// Elements that already carry a link keep it.
    pub fn apply(&self, scene: &mut Scene) {
        if self.is_empty() {
            return;
        }
        for element in &mut scene.elements {
            if element.link.is_some() {
                continue;
            }
            let template = match element.meta.role {
                Role::Frame => self.procedure.as_deref(),
                Role::Block | Role::BlockLabel => self.block.as_deref(),
                _ => None,
            };
            let Some(template) = template else {
                continue;
            };
            let procedure_id = element.meta.procedure_id.as_deref();
            let block_id = element.meta.block_id.as_deref();
            element.link = expand(template, |field| match field {
                "procedure_id" => procedure_id,
                "block_id" => block_id,
                _ => None,
            });
        }
    }
}

/// Substitutes `{name}` placeholders through `lookup`. `None` when a placeholder names an
/// unknown or empty field, or the template is blank. Unbalanced braces leave the template
/// untouched.
pub fn expand<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
    let template = decode_braces(template.trim());
    if template.is_empty() {
        return None;
    }
    if !template.contains('{') && !template.contains('}') {
        return Some(template);
    }

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for f in chars.by_ref() {
                    if f == '}' {
                        closed = true;
                        break;
                    }
                    if f == '{' {
                        break;
                    }
                    field.push(f);
                }
                if !closed {
                    return Some(template);
                }
                match lookup(field.trim()).filter(|v| !v.is_empty()) {
                    Some(value) => out.push_str(value),
                    None => return None,
                }
            }
            '}' => return Some(template),
            other => out.push(other),
        }
    }
    Some(out)
}

fn decode_braces(template: &str) -> String {
    template
        .replace("%7B", "{")
        .replace("%7b", "{")
        .replace("%7D", "}")
        .replace("%7d", "}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(field: &str) -> Option<&'a str> {
        match field {
            "procedure_id" => Some("intake"),
            "block_id" => Some("a b"),
            "empty" => Some(""),
            _ => None,
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        assert_eq!(
            expand("https://wiki/p/{procedure_id}/b/{block_id}", ids).as_deref(),
            Some("https://wiki/p/intake/b/a b")
        );
        assert_eq!(
            expand("  https://wiki/p/%7Bprocedure_id%7d  ", ids).as_deref(),
            Some("https://wiki/p/intake")
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(
            expand("q={{x}}&p={procedure_id}", ids).as_deref(),
            Some("q={x}&p=intake")
        );
    }

    #[test]
    fn plain_and_malformed_templates_pass_through() {
        assert_eq!(expand("https://wiki/", ids).as_deref(), Some("https://wiki/"));
        assert_eq!(expand("a{procedure_id", ids).as_deref(), Some("a{procedure_id"));
        assert_eq!(expand("a}b{block_id}", ids).as_deref(), Some("a}b{block_id}"));
    }

    #[test]
    fn unknown_or_empty_fields_give_no_link() {
        assert_eq!(expand("x/{team}", ids), None);
        assert_eq!(expand("x/{empty}", ids), None);
        assert_eq!(expand("   ", ids), None);
    }
}
