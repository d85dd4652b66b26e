//! C# client renderer (`System.Net.Http.Json`).
//!
//! Emits one model class and one client class per AOM class plus a project
//! file. C# has no mapping for properties of unknown type; those fail the
//! render instead of being widened to `object`.

use heck::ToPascalCase;
use serde::Serialize;
use tera::Context;

use super::engine::{Layout, OutputRule, Scope};
use super::{banner, Artifact, RenderError, Renderer};
use crate::aom::{HttpVerb, MethodPayload, MethodReturn, Node, PropertyKind, RootObject};
use crate::naming::class_identifier;
use crate::resolver::ResolvedTemplate;

pub struct CSharpRenderer;

#[derive(Debug, Serialize)]
struct ClassView {
    name: String,
    properties: Vec<PropertyView>,
    methods: Vec<MethodView>,
}

#[derive(Debug, Serialize)]
struct PropertyView {
    name: String,
    wire: String,
    ty: String,
    init: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct MethodView {
    name: String,
    returns: String,
    params: String,
    body: Vec<String>,
}

static LAYOUT: Layout = Layout {
    sources: &[
        ("model.cs", MODEL_TEMPLATE),
        ("client.cs", CLIENT_TEMPLATE),
        ("project.csproj", PROJECT_TEMPLATE),
    ],
    outputs: &[
        OutputRule {
            template: "model.cs",
            path: "src/{{ namespace }}/Models/{{ class.name }}.cs",
            scope: Scope::Class,
        },
        OutputRule {
            template: "client.cs",
            path: "src/{{ namespace }}/Clients/{{ class.name }}Client.cs",
            scope: Scope::Class,
        },
        OutputRule {
            template: "project.csproj",
            path: "src/{{ namespace }}/{{ namespace }}.csproj",
            scope: Scope::Model,
        },
    ],
};

const MODEL_TEMPLATE: &str = r##"// {{ header }}
#nullable enable
using System.Collections.Generic;
using System.Text.Json.Serialization;

namespace {{ namespace }}.Models;

public sealed class {{ class.name }}
{
{%- for p in class.properties %}
    [JsonPropertyName("{{ p.wire }}")]
    public {{ p.ty }} {{ p.name }} { get; set; }{% if p.init %} = {{ p.init }};{% endif %}
{% endfor -%}
}
"##;

const CLIENT_TEMPLATE: &str = r##"// {{ header }}
#nullable enable
using System;
using System.Collections.Generic;
using System.Net.Http;
using System.Net.Http.Json;
using System.Threading;
using System.Threading.Tasks;
using {{ namespace }}.Models;

namespace {{ namespace }}.Clients;

public sealed class {{ class.name }}Client
{
    private readonly HttpClient _http;

    public {{ class.name }}Client(HttpClient http)
    {
        _http = http;
    }
{% for m in class.methods %}
    public async {{ m.returns }} {{ m.name }}({{ m.params }})
    {
{%- for line in m.body %}
        {{ line }}
{%- endfor %}
    }
{% endfor -%}
}
"##;

const PROJECT_TEMPLATE: &str = r##"<!-- {{ header }} -->
<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <Nullable>enable</Nullable>
    <RootNamespace>{{ namespace }}</RootNamespace>
    <AssemblyName>{{ namespace }}</AssemblyName>
  </PropertyGroup>
</Project>
"##;

impl Renderer for CSharpRenderer {
    fn language(&self) -> &'static str {
        "csharp"
    }

    fn render(&self, model: &RootObject, template: &ResolvedTemplate) -> Result<Vec<Artifact>, RenderError> {
        let namespace = model.namespace();
        let classes = namespace
            .classes()
            .map(|(node, _)| class_view(node))
            .collect::<Result<Vec<_>, _>>()?;

        let mut base = Context::new();
        base.insert("header", &banner(template));
        base.insert("namespace", namespace.identifier());
        LAYOUT.render(&template.name, &base, &classes)
    }
}

fn class_view(class: &Node) -> Result<ClassView, RenderError> {
    let name = class.identifier().to_string();

    let mut properties = Vec::new();
    for (node, payload) in class.properties() {
        let ty = cs_type(&payload.kind).ok_or_else(|| RenderError::unsupported_property(node, &payload.kind))?;
        let member = class_identifier(node.identifier());
        if member == name {
            return Err(RenderError::UnsupportedConstruct {
                node: node.path().to_string(),
                kind: "property named like its enclosing class".into(),
            });
        }
        let (ty, init) = if payload.nullable {
            (format!("{ty}?"), None)
        } else {
            let init = match &payload.kind {
                PropertyKind::String => Some("string.Empty"),
                PropertyKind::List(_) => Some("new()"),
                PropertyKind::Reference(_) => Some("default!"),
                _ => None,
            };
            (ty, init)
        };
        properties.push(PropertyView {
            name: member,
            wire: string_literal_body(&payload.wire_name),
            ty,
            init,
        });
    }

    let methods = class
        .methods()
        .map(|(node, payload)| method_view(node, payload))
        .collect();

    Ok(ClassView {
        name,
        properties,
        methods,
    })
}

/// Escape text for use between the quotes of a regular C# string literal.
fn string_literal_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn cs_type(kind: &PropertyKind) -> Option<String> {
    Some(match kind {
        PropertyKind::String => "string".to_string(),
        PropertyKind::Number => "double".to_string(),
        PropertyKind::Boolean => "bool".to_string(),
        PropertyKind::List(inner) => format!("List<{}>", cs_type(inner)?),
        PropertyKind::Reference(class) => class.clone(),
        PropertyKind::Unknown => return None,
    })
}

fn method_view(node: &Node, method: &MethodPayload) -> MethodView {
    let route = method
        .route
        .trim_start_matches('/')
        .replace("{id}", "{Uri.EscapeDataString(id)}");
    let url = format!("$\"{route}\"");

    let mut params = Vec::new();
    if method.takes_id {
        params.push("string id".to_string());
    }
    if let Some(body) = &method.body {
        params.push(format!("{body} body"));
    }
    params.push("CancellationToken ct = default".to_string());

    let call = match (method.verb, method.body.is_some()) {
        (HttpVerb::Get, _) => format!("_http.GetAsync({url}, ct)"),
        (HttpVerb::Post, true) => format!("_http.PostAsJsonAsync({url}, body, ct)"),
        (HttpVerb::Post, false) => format!("_http.PostAsync({url}, null, ct)"),
        (HttpVerb::Put, true) => format!("_http.PutAsJsonAsync({url}, body, ct)"),
        (HttpVerb::Put, false) => format!("_http.PutAsync({url}, null, ct)"),
        (HttpVerb::Delete, _) => format!("_http.DeleteAsync({url}, ct)"),
    };
    let mut body = vec![
        format!("using var response = await {call};"),
        "response.EnsureSuccessStatusCode();".to_string(),
    ];

    let returns = match &method.returns {
        MethodReturn::Nothing => "Task".to_string(),
        MethodReturn::One(class) => {
            body.push(format!(
                "var result = await response.Content.ReadFromJsonAsync<{class}>(cancellationToken: ct);"
            ));
            body.push("return result ?? throw new HttpRequestException(\"Empty response body\");".to_string());
            format!("Task<{class}>")
        }
        MethodReturn::Many(class) => {
            body.push(format!(
                "var result = await response.Content.ReadFromJsonAsync<List<{class}>>(cancellationToken: ct);"
            ));
            body.push(format!("return result ?? new List<{class}>();"));
            format!("Task<List<{class}>>")
        }
    };

    MethodView {
        name: format!("{}Async", node.identifier().to_pascal_case()),
        returns,
        params: params.join(", "),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{bound, model};
    use super::*;
    use crate::error::{ErrorKind, Kinded};
    use serde_json::json;

    fn render(value: serde_json::Value) -> Result<Vec<Artifact>, RenderError> {
        CSharpRenderer.render(&model(value), &bound("csharp-rest", "csharp", "httpclient"))
    }

    fn find<'a>(artifacts: &'a [Artifact], path: &str) -> &'a str {
        &artifacts
            .iter()
            .find(|a| a.path == path)
            .unwrap_or_else(|| panic!("missing artifact {path}"))
            .content
    }

    #[test]
    fn test_layout() {
        let artifacts = render(json!({"name": "User", "properties": {"id": "string", "age": "number"}})).unwrap();
        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "src/Acme.Shop/Acme.Shop.csproj",
                "src/Acme.Shop/Clients/UserClient.cs",
                "src/Acme.Shop/Models/User.cs",
            ]
        );
    }

    #[test]
    fn test_model_class() {
        let artifacts = render(json!({
            "name": "User",
            "properties": {"id": "string", "age": "number", "tags": ["x"], "nick": "string?", "active": true}
        }))
        .unwrap();
        let model = find(&artifacts, "src/Acme.Shop/Models/User.cs");

        assert!(model.starts_with("// Generated by csharp-rest 1.0.0 (0a1b2c3). Do not edit.\n"));
        assert!(model.contains("namespace Acme.Shop.Models;"));
        assert!(model.contains("public sealed class User\n{"));
        assert!(model.contains("    [JsonPropertyName(\"id\")]\n    public string Id { get; set; } = string.Empty;\n"));
        assert!(model.contains("public double Age { get; set; }\n"));
        assert!(model.contains("public List<string> Tags { get; set; } = new();"));
        assert!(model.contains("public string? Nick { get; set; }\n"));
        assert!(model.contains("public bool Active { get; set; }\n"));
        assert!(model.ends_with("}\n"));

        // properties in identifier order
        let active = model.find("Active").unwrap();
        let tags = model.find("Tags").unwrap();
        assert!(active < tags);
    }

    #[test]
    fn test_client_methods() {
        let artifacts = render(json!({
            "name": "User",
            "properties": {"id": "string"},
            "relationships": [{"target": "User", "name": "friends", "cardinality": "many"}]
        }))
        .unwrap();
        let client = find(&artifacts, "src/Acme.Shop/Clients/UserClient.cs");

        assert!(client.contains("public sealed class UserClient"));
        assert!(client.contains("public async Task<List<User>> ListAsync(CancellationToken ct = default)"));
        assert!(client.contains("public async Task<User> GetAsync(string id, CancellationToken ct = default)"));
        assert!(client.contains("public async Task<User> CreateAsync(User body, CancellationToken ct = default)"));
        assert!(client.contains("public async Task DeleteAsync(string id, CancellationToken ct = default)"));
        assert!(client.contains("public async Task<List<User>> ListFriendsAsync(string id, CancellationToken ct = default)"));
        assert!(client.contains("using var response = await _http.PutAsJsonAsync($\"users/{Uri.EscapeDataString(id)}\", body, ct);"));
        assert!(client.contains("_http.GetAsync($\"users/{Uri.EscapeDataString(id)}/friends\", ct)"));
    }

    #[test]
    fn test_unknown_property_is_unsupported() {
        let err = render(json!({"name": "User", "properties": {"id": "string", "nickname": null}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConstruct);
        let message = err.to_string();
        assert!(message.contains("Acme.Shop::User::nickname"), "{message}");
        assert!(message.contains("unknown"), "{message}");
    }

    #[test]
    fn test_list_of_unknown_is_unsupported() {
        let err = render(json!({"name": "User", "properties": {"bag": []}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConstruct);
        assert!(err.to_string().contains("list<unknown>"));
    }

    #[test]
    fn test_member_named_like_class() {
        let err = render(json!({"name": "Name", "properties": {"name": "string"}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConstruct);
    }

    #[test]
    fn test_wire_names_are_kept() {
        let artifacts = render(json!({
            "name": "User",
            "properties": {"e-mail": "string", "first name": "string?", "say \"hi\"": "string?"}
        }))
        .unwrap();
        let model = find(&artifacts, "src/Acme.Shop/Models/User.cs");
        assert!(model.contains("    [JsonPropertyName(\"e-mail\")]\n    public string EMail { get; set; } = string.Empty;\n"));
        assert!(model.contains("    [JsonPropertyName(\"first name\")]\n    public string? FirstName { get; set; }\n"));
        assert!(model.contains("[JsonPropertyName(\"say \\\"hi\\\"\")]"));
    }

    #[test]
    fn test_leading_digit_identifiers() {
        let artifacts = render(json!({"name": "2fa", "properties": {"2nd": "string", "id": "string"}})).unwrap();
        let model = find(&artifacts, "src/Acme.Shop/Models/_2fa.cs");
        assert!(model.contains("public sealed class _2fa\n{"));
        assert!(model.contains("    [JsonPropertyName(\"2nd\")]\n    public string _2nd { get; set; } = string.Empty;\n"));
        let client = find(&artifacts, "src/Acme.Shop/Clients/_2faClient.cs");
        assert!(client.contains("public sealed class _2faClient"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let value = json!([
            {"name": "User", "properties": {"id": "string", "address": {"city": "Paris"}}, "relationships": [{"target": "Order", "cardinality": "many"}]},
            {"name": "Order", "properties": {"total": 1.5}}
        ]);
        let root = model(value);
        let template = bound("csharp-rest", "csharp", "httpclient");
        let first = CSharpRenderer.render(&root, &template).unwrap();
        let second = CSharpRenderer.render(&root, &template).unwrap();
        assert_eq!(first, second);
    }
}
