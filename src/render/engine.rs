//! Layout-driven Tera rendering shared by the built-in renderers.
//!
//! A layout lists template sources and output rules. An output rule renders
//! once per model or once per class; its path is itself a Tera expression
//! rendered against the same context as the content.

use serde::Serialize;
use std::error::Error as _;
use tera::{Context, Tera};

use super::{filters, Artifact, RenderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// One artifact for the whole model.
    Model,
    /// One artifact per class, with `class` in the context.
    Class,
}

#[derive(Debug)]
pub(crate) struct OutputRule {
    pub template: &'static str,
    pub path: &'static str,
    pub scope: Scope,
}

#[derive(Debug)]
pub(crate) struct Layout {
    pub sources: &'static [(&'static str, &'static str)],
    pub outputs: &'static [OutputRule],
}

impl Layout {
    fn load(&self, template_name: &str) -> Result<Tera, RenderError> {
        let mut tera = Tera::default();
        filters::register(&mut tera);
        let mut raw: Vec<(String, &str)> = self
            .sources
            .iter()
            .map(|(name, body)| (name.to_string(), *body))
            .collect();
        raw.extend(self.outputs.iter().map(|o| (path_template(o.template), o.path)));
        tera.add_raw_templates(raw)
            .map_err(|e| engine_error(template_name, "<layout>", &e))?;
        Ok(tera)
    }

    /// Render every output rule. Artifacts come back sorted by path.
    pub fn render<C: Serialize>(
        &self,
        template_name: &str,
        base: &Context,
        classes: &[C],
    ) -> Result<Vec<Artifact>, RenderError> {
        let tera = self.load(template_name)?;
        let mut artifacts = Vec::new();

        for rule in self.outputs {
            match rule.scope {
                Scope::Model => artifacts.push(render_rule(&tera, template_name, rule, base)?),
                Scope::Class => {
                    for class in classes {
                        let mut context = base.clone();
                        context.insert("class", class);
                        artifacts.push(render_rule(&tera, template_name, rule, &context)?);
                    }
                }
            }
        }

        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }
}

fn path_template(template: &str) -> String {
    format!("{template}#path")
}

fn render_rule(
    tera: &Tera,
    template_name: &str,
    rule: &OutputRule,
    context: &Context,
) -> Result<Artifact, RenderError> {
    let content = tera
        .render(rule.template, context)
        .map_err(|e| engine_error(template_name, rule.template, &e))?;
    let path = tera
        .render(&path_template(rule.template), context)
        .map_err(|e| engine_error(template_name, rule.path, &e))?;
    Ok(Artifact::new(path.trim(), content))
}

/// Tera's top-level message is generic; the useful part is in the chain.
fn engine_error(template_name: &str, source: &str, error: &tera::Error) -> RenderError {
    let mut message = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    RenderError::Engine {
        template: format!("{template_name}/{source}"),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Kinded};

    #[derive(Serialize)]
    struct Item {
        name: String,
    }

    static LAYOUT: Layout = Layout {
        sources: &[
            ("item.txt", "item {{ class.name }} in {{ ns }}\n"),
            ("index.txt", "{% for c in names %}{{ c }};{% endfor %}"),
        ],
        outputs: &[
            OutputRule {
                template: "item.txt",
                path: "items/{{ class.name | kebab_case }}.txt",
                scope: Scope::Class,
            },
            OutputRule {
                template: "index.txt",
                path: "index.txt",
                scope: Scope::Model,
            },
        ],
    };

    #[test]
    fn test_layout_renders_per_scope() {
        let mut base = Context::new();
        base.insert("ns", "Acme");
        base.insert("names", &vec!["B", "A"]);
        let classes = vec![
            Item { name: "OrderLine".into() },
            Item { name: "Account".into() },
        ];
        let artifacts = LAYOUT.render("demo", &base, &classes).unwrap();
        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["index.txt", "items/account.txt", "items/order-line.txt"]);
        assert_eq!(artifacts[2].content, "item OrderLine in Acme\n");
        assert_eq!(artifacts[0].content, "B;A;");
    }

    #[test]
    fn test_missing_variable_is_engine_error() {
        let base = Context::new();
        let err = LAYOUT.render("demo", &base, &[Item { name: "X".into() }]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert!(err.to_string().contains("demo/"));
    }
}
