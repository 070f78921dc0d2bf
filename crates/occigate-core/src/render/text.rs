//! `text/plain` OCCI rendering and `text/uri-list`
//!
//! ```text
//! Category: compute; scheme="http://schemas.ogf.org/occi/infrastructure#"; class="kind"
//! X-OCCI-Attribute: occi.core.id="6df690d2"
//! X-OCCI-Attribute: occi.compute.cores=2
//! Link: <http://localhost:3000/compute/6df690d2?action=stop>; rel="http://schemas.ogf.org/occi/infrastructure/compute/action#stop"
//! X-OCCI-Location: http://localhost:3000/storage/1
//! ```

use super::{RequestBody, Renderer};
use crate::category::{AttributeValue, Category, CategoryClass, CategoryId, Mixin};
use crate::collection::Collection;
use crate::entity::{ActionInstance, Attributes, Entity, Link, Resource, attr};
use crate::error::{CoreError, Result};

/// Pseudo attribute carrying the entity state in text renderings
pub const STATE_ATTRIBUTE: &str = "occi.core.state";

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn format_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => quote(s),
        other => other.to_string(),
    }
}

fn category_line(category: &Category) -> String {
    let id = category.id();
    let mut line = format!(
        "Category: {}; scheme={}; class={}",
        id.term(),
        quote(id.scheme()),
        quote(category.class().as_str())
    );
    if let Some(title) = category.title() {
        line.push_str(&format!("; title={}", quote(title)));
    }
    let related = category.related();
    if !related.is_empty() {
        let rel: Vec<String> = related.iter().map(|r| r.to_string()).collect();
        line.push_str(&format!("; rel={}", quote(&rel.join(" "))));
    }
    if let Some(location) = category.location() {
        line.push_str(&format!("; location={}", quote(location)));
    }
    let attributes = category.attributes();
    if !attributes.is_empty() {
        let names: Vec<String> = attributes
            .iter()
            .map(|(name, def)| {
                let mut flags = Vec::new();
                if !def.mutable {
                    flags.push("immutable");
                }
                if def.mandatory {
                    flags.push("required");
                }
                if flags.is_empty() {
                    name.clone()
                } else {
                    format!("{}{{{}}}", name, flags.join(" "))
                }
            })
            .collect();
        line.push_str(&format!("; attributes={}", quote(&names.join(" "))));
    }
    let actions: &[CategoryId] = match category {
        Category::Kind(k) => &k.actions,
        Category::Mixin(m) => &m.actions,
        Category::Action(_) => &[],
    };
    if !actions.is_empty() {
        let ids: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
        line.push_str(&format!("; actions={}", quote(&ids.join(" "))));
    }
    line
}

fn short_category_line(id: &CategoryId, class: CategoryClass) -> String {
    format!(
        "Category: {}; scheme={}; class={}",
        id.term(),
        quote(id.scheme()),
        quote(class.as_str())
    )
}

fn attribute_lines(out: &mut Vec<String>, id: &str, attributes: &Attributes) {
    out.push(format!("X-OCCI-Attribute: {}={}", attr::ID, quote(id)));
    for (name, value) in attributes {
        out.push(format!("X-OCCI-Attribute: {}={}", name, format_value(value)));
    }
}

fn resource_lines(renderer: &Renderer<'_>, resource: &Resource) -> Vec<String> {
    let mut out = vec![short_category_line(&resource.kind, CategoryClass::Kind)];
    for mixin in &resource.mixins {
        out.push(short_category_line(mixin, CategoryClass::Mixin));
    }
    attribute_lines(&mut out, &resource.id, &resource.attributes);
    if let Some(state) = &resource.state {
        out.push(format!("X-OCCI-Attribute: {}={}", STATE_ATTRIBUTE, quote(state)));
    }
    for link in &resource.links {
        out.push(format!("Link: <{}>", link));
    }
    let uri = renderer.entity_uri(&resource.kind, &resource.id);
    for action in &resource.actions {
        out.push(format!(
            "Link: <{}?action={}>; rel={}",
            uri,
            action.term(),
            quote(&action.to_string())
        ));
    }
    out
}

fn link_lines(link: &Link) -> Vec<String> {
    let mut out = vec![short_category_line(&link.kind, CategoryClass::Kind)];
    for mixin in &link.mixins {
        out.push(short_category_line(mixin, CategoryClass::Mixin));
    }
    attribute_lines(&mut out, &link.id, &link.attributes);
    out.push(format!("X-OCCI-Attribute: {}={}", attr::SOURCE, quote(&link.source)));
    out.push(format!("X-OCCI-Attribute: {}={}", attr::TARGET, quote(&link.target)));
    out
}

/// Categories in full, then a single entity in full or several entities as
/// `X-OCCI-Location` lines
pub(super) fn render(renderer: &Renderer<'_>, collection: &Collection) -> String {
    let mut lines: Vec<String> = collection.categories().map(|c| category_line(&c)).collect();

    match (collection.resources.as_slice(), collection.links.as_slice()) {
        ([resource], []) => lines.extend(resource_lines(renderer, resource)),
        ([], [link]) => lines.extend(link_lines(link)),
        _ => {
            for uri in renderer.entity_uris(collection) {
                lines.push(format!("X-OCCI-Location: {}", uri));
            }
        }
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Split on `sep` outside double quotes
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unquote(s: &str) -> Result<String> {
    let s = s.trim();
    let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return Ok(s.to_string());
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let next = chars
                .next()
                .ok_or_else(|| CoreError::Parse(format!("dangling escape in {}", s)))?;
            out.push(next);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn parse_value(raw: &str) -> Result<AttributeValue> {
    let raw = raw.trim();
    if raw.starts_with('"') {
        return Ok(AttributeValue::String(unquote(raw)?));
    }
    Ok(match raw {
        "true" => AttributeValue::Boolean(true),
        "false" => AttributeValue::Boolean(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                AttributeValue::Integer(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                AttributeValue::Float(f)
            } else {
                AttributeValue::String(raw.to_string())
            }
        }
    })
}

struct CategoryRef {
    id: CategoryId,
    class: CategoryClass,
    title: Option<String>,
    related: Vec<CategoryId>,
    location: Option<String>,
}

fn parse_category(value: &str) -> Result<CategoryRef> {
    let mut parts = split_unquoted(value, ';').into_iter();
    let term = parts.next().unwrap_or_default().trim().to_string();
    let mut scheme = None;
    let mut class = None;
    let mut title = None;
    let mut related = Vec::new();
    let mut location = None;

    for part in parts {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let val = unquote(raw)?;
        match key.trim() {
            "scheme" => scheme = Some(val),
            "class" => class = CategoryClass::parse(&val),
            "title" => title = Some(val),
            "rel" => {
                for r in val.split_whitespace() {
                    related.push(CategoryId::parse(r)?);
                }
            }
            "location" => location = Some(val),
            _ => {}
        }
    }

    let scheme = scheme.ok_or_else(|| CoreError::Parse(format!("category {} has no scheme", term)))?;
    let class = class.ok_or_else(|| CoreError::Parse(format!("category {} has no class", term)))?;
    Ok(CategoryRef {
        id: CategoryId::new(scheme, term)?,
        class,
        title,
        related,
        location,
    })
}

fn link_target(value: &str) -> Option<&str> {
    let value = value.trim();
    let rest = value.strip_prefix('<')?;
    let end = rest.find('>')?;
    Some(&rest[..end])
}

/// Parse OCCI header lines into entities, mixin definitions, an action
/// invocation or locations
pub(super) fn parse(body: &str) -> Result<RequestBody> {
    let mut categories: Vec<CategoryRef> = Vec::new();
    let mut attributes = Attributes::new();
    let mut locations = Vec::new();
    let mut links = Vec::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CoreError::Parse(format!("malformed line: {}", line)))?;
        match name.trim().to_ascii_lowercase().as_str() {
            "category" => {
                for item in split_unquoted(value, ',') {
                    if !item.trim().is_empty() {
                        categories.push(parse_category(item)?);
                    }
                }
            }
            "x-occi-attribute" => {
                for item in split_unquoted(value, ',') {
                    if item.trim().is_empty() {
                        continue;
                    }
                    let (key, raw) = item
                        .split_once('=')
                        .ok_or_else(|| CoreError::Parse(format!("malformed attribute: {}", item)))?;
                    attributes.insert(key.trim().to_string(), parse_value(raw)?);
                }
            }
            "x-occi-location" => {
                locations.extend(
                    split_unquoted(value, ',')
                        .into_iter()
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty()),
                );
            }
            "link" => {
                for item in split_unquoted(value, ',') {
                    if let Some(target) = link_target(item)
                        && !target.contains("?action=")
                    {
                        links.push(target.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    let mut request = RequestBody {
        locations,
        ..Default::default()
    };

    if let Some(action) = categories.iter().find(|c| c.class == CategoryClass::Action) {
        request.action = Some(ActionInstance {
            action: action.id.clone(),
            attributes,
        });
        return Ok(request);
    }

    let kind = categories.iter().find(|c| c.class == CategoryClass::Kind);
    let mixins = categories.iter().filter(|c| c.class == CategoryClass::Mixin);

    match kind {
        Some(kind) => {
            let id = attributes
                .remove(attr::ID)
                .map(|v| v.to_string())
                .unwrap_or_default();
            let state = attributes.remove(STATE_ATTRIBUTE).map(|v| v.to_string());
            let source = attributes.remove(attr::SOURCE);
            let target = attributes.remove(attr::TARGET);

            match (source, target) {
                (Some(source), Some(target)) => {
                    let mut link = Link::new(kind.id.clone(), source.to_string(), target.to_string());
                    link.set_id(id);
                    link.mixins = mixins.map(|m| m.id.clone()).collect();
                    link.attributes = attributes;
                    request.collection.links.push(link);
                }
                (source, target) => {
                    let mut resource = Resource::new(kind.id.clone()).with_id(id);
                    resource.mixins = mixins.map(|m| m.id.clone()).collect();
                    resource.state = state;
                    resource.links = links;
                    resource.attributes = attributes;
                    // a lone source or target stays an ordinary attribute
                    if let Some(source) = source {
                        resource.attributes.insert(attr::SOURCE.to_string(), source);
                    }
                    if let Some(target) = target {
                        resource.attributes.insert(attr::TARGET.to_string(), target);
                    }
                    request.collection.resources.push(resource);
                }
            }
        }
        None => {
            for m in mixins {
                let mut mixin = Mixin::new(m.id.clone());
                mixin.title = m.title.clone();
                mixin.related = m.related.clone();
                mixin.location = m.location.clone();
                request.collection.mixins.push(mixin);
            }
        }
    }

    Ok(request)
}

/// Non-comment lines of a `text/uri-list` body
pub(super) fn parse_uri_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::schema::infrastructure;

    #[test]
    fn test_parse_compute_request() {
        let body = r#"Category: compute; scheme="http://schemas.ogf.org/occi/infrastructure#"; class="kind"
Category: tpl_ubuntu__abc; scheme="http://schemas.ogf.org/occi/infrastructure/os_tpl#"; class="mixin"
X-OCCI-Attribute: occi.core.title="web, frontend"
X-OCCI-Attribute: occi.compute.cores=2, occi.compute.memory=1.5
"#;
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.collection.resources.len(), 1);
        let r = &parsed.collection.resources[0];
        assert_eq!(r.kind, infrastructure::compute());
        assert_eq!(r.mixins.len(), 1);
        assert_eq!(r.title(), Some("web, frontend"));
        assert_eq!(r.attributes["occi.compute.cores"], AttributeValue::Integer(2));
        assert_eq!(r.attributes["occi.compute.memory"], AttributeValue::Float(1.5));
        assert!(r.id.is_empty());
    }

    #[test]
    fn test_parse_action_request() {
        let body = r#"Category: stop; scheme="http://schemas.ogf.org/occi/infrastructure/compute/action#"; class="action"
X-OCCI-Attribute: method="poweroff"
"#;
        let parsed = parse(body).unwrap();
        let action = parsed.action.unwrap();
        assert_eq!(action.action, infrastructure::compute_action("stop"));
        assert_eq!(action.param("method").as_deref(), Some("poweroff"));
        assert!(parsed.collection.is_empty());
    }

    #[test]
    fn test_parse_mixin_definition() {
        let body = r#"Category: gold; scheme="http://example.org/tags#"; class="mixin"; title="Gold tier"; location="/tags/gold/""#;
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.collection.mixins.len(), 1);
        let mixin = &parsed.collection.mixins[0];
        assert_eq!(mixin.location.as_deref(), Some("/tags/gold/"));
        assert_eq!(mixin.title.as_deref(), Some("Gold tier"));
    }

    #[test]
    fn test_parse_locations_and_link() {
        let body = "X-OCCI-Location: /compute/1, /compute/2\nX-OCCI-Location: /compute/3\n";
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.locations, vec!["/compute/1", "/compute/2", "/compute/3"]);

        let body = r#"Category: storagelink; scheme="http://schemas.ogf.org/occi/infrastructure#"; class="kind"
X-OCCI-Attribute: occi.core.source="/compute/1", occi.core.target="/storage/2"
"#;
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.collection.links.len(), 1);
        assert_eq!(parsed.collection.links[0].target, "/storage/2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("no colon here").is_err());
        assert!(parse(r#"Category: compute; class="kind""#).is_err());
    }

    #[test]
    fn test_render_single_resource_parses_back() {
        let registry = Registry::with_builtin().unwrap();
        let renderer = Renderer::new("http://localhost:3000", &registry);
        let mut resource = Resource::new(infrastructure::compute())
            .with_id("42")
            .with_attribute("occi.core.title", "say \"hi\"")
            .with_attribute("occi.compute.cores", 4i64)
            .with_state("active");
        resource.actions = vec![infrastructure::compute_action("stop")];
        let text = render(&renderer, &Collection::from(vec![resource.clone()]));

        assert!(text.contains(
            "Link: <http://localhost:3000/compute/42?action=stop>; rel=\"http://schemas.ogf.org/occi/infrastructure/compute/action#stop\""
        ));
        let parsed = parse(&text).unwrap();
        let back = &parsed.collection.resources[0];
        assert_eq!(back.id, "42");
        assert_eq!(back.state.as_deref(), Some("active"));
        assert_eq!(back.attributes, resource.attributes);
    }

    #[test]
    fn test_render_many_resources_as_locations() {
        let registry = Registry::with_builtin().unwrap();
        let renderer = Renderer::new("http://h", &registry);
        let c = Collection::from(vec![
            Resource::new(infrastructure::network()).with_id("1"),
            Resource::new(infrastructure::network()).with_id("2"),
        ]);
        assert_eq!(
            render(&renderer, &c),
            "X-OCCI-Location: http://h/network/1\nX-OCCI-Location: http://h/network/2\n"
        );
    }

    #[test]
    fn test_render_categories() {
        let registry = Registry::with_builtin().unwrap();
        let renderer = Renderer::new("http://h", &registry);
        let c = registry.get(Some(&[infrastructure::compute()]));
        let text = render(&renderer, &c);
        assert!(text.starts_with("Category: compute; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"kind\""));
        assert!(text.contains("location=\"/compute/\""));
        assert!(text.contains("rel=\"http://schemas.ogf.org/occi/core#resource\""));
    }

    #[test]
    fn test_uri_list_skips_comments() {
        assert_eq!(
            parse_uri_list("# comment\nhttp://h/compute/1\n\n"),
            vec!["http://h/compute/1"]
        );
    }
}
