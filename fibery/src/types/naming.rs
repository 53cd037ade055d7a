//! Human readable titles derived from namespaced backend names.

fn name_override(name: &str) -> &str {
    match name {
        "fibery/type" => "fibery/Database",
        "fibery/app" => "fibery/Space",
        other => other,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Strip the namespace, `Tasks/Due Date` becomes `Due Date`.
fn local_name(keyword: &str) -> &str {
    keyword
        .split_once('/')
        .map(|(_, name)| name)
        .unwrap_or(keyword)
}

/// Old style names are lowercase keywords such as `fibery/creation-date`.
fn is_keyword_style(name: &str) -> bool {
    name.to_lowercase() == name && !name.contains('~')
}

fn keyword_title(name: &str) -> String {
    let last = name.rsplit('/').next().unwrap_or_default();
    last.split('-').map(capitalize).collect::<Vec<_>>().join(" ")
}

/// Title of a database or a non-enum field.
pub fn title_for(name: &str) -> String {
    let name = local_name(name_override(name));
    if is_keyword_style(name) {
        keyword_title(name)
    } else {
        capitalize(name).replace('~', " ")
    }
}

/// Title of a field, taking the few holder specific overrides into account.
pub fn field_title(name: &str, holder_type: &str) -> String {
    if name == "fibery/role" && holder_type == "fibery/user" {
        return "User Role".to_string();
    }
    title_for(name)
}
