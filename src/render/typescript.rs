//! TypeScript client renderer (`fetch`).

use heck::{ToKebabCase, ToLowerCamelCase};
use serde::Serialize;
use std::collections::BTreeSet;
use tera::Context;

use super::engine::{Layout, OutputRule, Scope};
use super::{banner, Artifact, RenderError, Renderer};
use crate::aom::{MethodPayload, MethodReturn, Node, PropertyKind, RootObject};
use crate::resolver::ResolvedTemplate;

pub struct TypeScriptRenderer;

#[derive(Debug, Serialize)]
struct ClassView {
    name: String,
    properties: Vec<PropertyView>,
    methods: Vec<MethodView>,
    model_imports: Vec<Import>,
    client_imports: Vec<Import>,
}

#[derive(Debug, Serialize)]
struct PropertyView {
    name: String,
    ty: String,
}

#[derive(Debug, Serialize)]
struct MethodView {
    name: String,
    params: String,
    returns: String,
    verb: String,
    path: String,
    body: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct Import {
    name: String,
    file: String,
}

impl Import {
    fn of(class: &str) -> Self {
        Self {
            name: class.to_string(),
            file: class.to_kebab_case(),
        }
    }
}

static LAYOUT: Layout = Layout {
    sources: &[
        ("model.ts", MODEL_TEMPLATE),
        ("client.ts", CLIENT_TEMPLATE),
        ("http.ts", HTTP_TEMPLATE),
        ("index.ts", INDEX_TEMPLATE),
    ],
    outputs: &[
        OutputRule {
            template: "model.ts",
            path: "src/models/{{ class.name | kebab_case }}.ts",
            scope: Scope::Class,
        },
        OutputRule {
            template: "client.ts",
            path: "src/clients/{{ class.name | kebab_case }}-client.ts",
            scope: Scope::Class,
        },
        OutputRule {
            template: "http.ts",
            path: "src/http.ts",
            scope: Scope::Model,
        },
        OutputRule {
            template: "index.ts",
            path: "src/index.ts",
            scope: Scope::Model,
        },
    ],
};

const MODEL_TEMPLATE: &str = r##"// {{ header }}
{% for imp in class.model_imports %}import type { {{ imp.name }} } from './{{ imp.file }}';
{% endfor %}
export interface {{ class.name }} {
{%- for p in class.properties %}
  {{ p.name }}: {{ p.ty }};
{%- endfor %}
}
"##;

const CLIENT_TEMPLATE: &str = r##"// {{ header }}
import { HttpClient } from '../http';
{% for imp in class.client_imports %}import type { {{ imp.name }} } from '../models/{{ imp.file }}';
{% endfor %}
export class {{ class.name }}Client {
  constructor(private readonly http: HttpClient) {}
{% for m in class.methods %}
  async {{ m.name }}({{ m.params }}): Promise<{{ m.returns }}> {
    return this.http.request<{{ m.returns }}>('{{ m.verb }}', `{{ m.path }}`{% if m.body %}, body{% endif %});
  }
{% endfor -%}
}
"##;

const HTTP_TEMPLATE: &str = r##"// {{ header }}
export class HttpClient {
  constructor(private readonly baseUrl: string, private readonly init: RequestInit = {}) {}

  async request<T>(method: string, path: string, body?: unknown): Promise<T> {
    const response = await fetch(this.baseUrl + path, {
      ...this.init,
      method,
      headers: { 'Content-Type': 'application/json' },
      body: body === undefined ? undefined : JSON.stringify(body),
    });
    if (!response.ok) {
      throw new Error(`${method} ${path} failed with status ${response.status}`);
    }
    if (response.status === 204) {
      return undefined as T;
    }
    return (await response.json()) as T;
  }
}
"##;

const INDEX_TEMPLATE: &str = r##"// {{ header }}
export * from './http';
{% for c in classes %}export * from './models/{{ c | kebab_case }}';
export * from './clients/{{ c | kebab_case }}-client';
{% endfor -%}
"##;

impl Renderer for TypeScriptRenderer {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn render(&self, model: &RootObject, template: &ResolvedTemplate) -> Result<Vec<Artifact>, RenderError> {
        let namespace = model.namespace();
        let classes: Vec<ClassView> = namespace.classes().map(|(node, _)| class_view(node)).collect();
        let names: Vec<&str> = classes.iter().map(|c| c.name.as_str()).collect();

        let mut base = Context::new();
        base.insert("header", &banner(template));
        base.insert("classes", &names);
        LAYOUT.render(&template.name, &base, &classes)
    }
}

fn class_view(class: &Node) -> ClassView {
    let name = class.identifier().to_string();
    let mut model_imports = BTreeSet::new();
    let mut client_imports = BTreeSet::from([Import::of(&name)]);

    let properties = class
        .properties()
        .map(|(_, payload)| {
            if let Some(target) = referenced_class(&payload.kind) {
                if target != name {
                    model_imports.insert(Import::of(target));
                }
            }
            let ty = ts_type(&payload.kind);
            PropertyView {
                name: property_key(&payload.wire_name),
                ty: if payload.nullable { format!("{ty} | null") } else { ty },
            }
        })
        .collect();

    let methods = class
        .methods()
        .map(|(node, payload)| {
            if let MethodReturn::One(target) | MethodReturn::Many(target) = &payload.returns {
                client_imports.insert(Import::of(target));
            }
            method_view(node, payload)
        })
        .collect();

    ClassView {
        name,
        properties,
        methods,
        model_imports: model_imports.into_iter().collect(),
        client_imports: client_imports.into_iter().collect(),
    }
}

/// Interface member key: the wire name, single-quoted unless it is a plain
/// identifier.
fn property_key(wire: &str) -> String {
    let mut chars = wire.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        return wire.to_string();
    }
    let mut out = String::with_capacity(wire.len() + 2);
    out.push('\'');
    for c in wire.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn ts_type(kind: &PropertyKind) -> String {
    match kind {
        PropertyKind::String => "string".to_string(),
        PropertyKind::Number => "number".to_string(),
        PropertyKind::Boolean => "boolean".to_string(),
        PropertyKind::Unknown => "unknown".to_string(),
        PropertyKind::List(inner) => format!("Array<{}>", ts_type(inner)),
        PropertyKind::Reference(class) => class.clone(),
    }
}

fn referenced_class(kind: &PropertyKind) -> Option<&str> {
    match kind {
        PropertyKind::List(inner) => referenced_class(inner),
        PropertyKind::Reference(class) => Some(class),
        _ => None,
    }
}

fn method_view(node: &Node, method: &MethodPayload) -> MethodView {
    let mut params = Vec::new();
    if method.takes_id {
        params.push("id: string".to_string());
    }
    if let Some(body) = &method.body {
        params.push(format!("body: {body}"));
    }
    let returns = match &method.returns {
        MethodReturn::Nothing => "void".to_string(),
        MethodReturn::One(class) => class.clone(),
        MethodReturn::Many(class) => format!("Array<{class}>"),
    };
    MethodView {
        name: node.identifier().to_lower_camel_case(),
        params: params.join(", "),
        returns,
        verb: method.verb.to_string(),
        path: method.route.replace("{id}", "${encodeURIComponent(id)}"),
        body: method.body.is_some(),
    }
}
