//! Naming conventions - Pure functions deriving table, key, accessor and pivot names
//!
//! All functions are total over non-empty identifiers. Empty or non-identifier
//! input is the caller's responsibility; the output for it is unspecified.

use convert_case::{Case, Casing};

/// Table name for a model identifier: snake_case, last word pluralized.
///
/// `User` becomes `users`, `UserProfile` becomes `user_profiles`.
pub fn table_name(model_id: &str) -> String {
    pluralize(&model_id.to_case(Case::Snake))
}

/// Foreign key pointing at a model: snake_case, singular, `_id` suffix.
///
/// `User` becomes `user_id`.
pub fn foreign_key_name(model_id: &str) -> String {
    format!("{}_id", singularize(&model_id.to_case(Case::Snake)))
}

/// Name under which a getter for `field` is registered (`first_name` -> `getFirstName`)
pub fn getter_name(field: &str) -> String {
    format!("get{}", field.to_case(Case::Pascal))
}

/// Name under which a setter for `field` is registered (`first_name` -> `setFirstName`)
pub fn setter_name(field: &str) -> String {
    format!("set{}", field.to_case(Case::Pascal))
}

/// Default pivot table joining two tables.
///
/// Both names are singularized, ordered lexicographically and joined with `_`,
/// so `("users", "roles")` and `("roles", "users")` both give `role_user`.
pub fn pivot_table_name(table_a: &str, table_b: &str) -> String {
    let mut tables = [singularize(table_a), singularize(table_b)];
    tables.sort();
    tables.join("_")
}

/// English pluralization of the trailing word
pub fn pluralize(word: &str) -> String {
    if word.ends_with('y') && !ends_with_any(word, &["ay", "ey", "iy", "oy", "uy"]) {
        format!("{}ies", &word[..word.len() - 1])
    } else if ends_with_any(word, &["s", "sh", "ch", "x", "z"]) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// English singularization of the trailing word.
///
/// Words that already read as singular (`status`, `bus`, `class`, `axis`)
/// come back unchanged.
pub fn singularize(word: &str) -> String {
    if word.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if ends_with_any(word, &["ouses", "auses"]) {
        word[..word.len() - 1].to_string()
    } else if ends_with_any(word, &["sses", "uses", "ches", "shes", "xes", "zes"]) {
        word[..word.len() - 2].to_string()
    } else if ends_with_any(word, &["ss", "us", "is"]) {
        word.to_string()
    } else if word.ends_with('s') && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn ends_with_any(word: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| word.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table_name("User"), "users");
        assert_eq!(table_name("Post"), "posts");
        assert_eq!(table_name("UserProfile"), "user_profiles");
        assert_eq!(table_name("Category"), "categories");
        assert_eq!(table_name("Address"), "addresses");
        assert_eq!(table_name("Key"), "keys");
    }

    #[test]
    fn test_foreign_key_names() {
        assert_eq!(foreign_key_name("User"), "user_id");
        assert_eq!(foreign_key_name("UserProfile"), "user_profile_id");
        assert_eq!(foreign_key_name("Users"), "user_id");
        assert_eq!(foreign_key_name("Category"), "category_id");
        assert_eq!(foreign_key_name("Status"), "status_id");
        assert_eq!(foreign_key_name("Bus"), "bus_id");
        assert_eq!(foreign_key_name("OrderStatus"), "order_status_id");
    }

    #[test]
    fn test_accessor_names() {
        assert_eq!(getter_name("first_name"), "getFirstName");
        assert_eq!(getter_name("email"), "getEmail");
        assert_eq!(setter_name("first_name"), "setFirstName");
        assert_eq!(setter_name("password"), "setPassword");
    }

    #[test]
    fn test_pivot_table_name_is_order_independent() {
        assert_eq!(pivot_table_name("users", "roles"), "role_user");
        assert_eq!(pivot_table_name("roles", "users"), "role_user");
        assert_eq!(pivot_table_name("posts", "categories"), "category_post");
        assert_eq!(pivot_table_name("statuses", "users"), "status_user");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("user"), "user");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("bus"), "bus");
        assert_eq!(singularize("buses"), "bus");
        assert_eq!(singularize("houses"), "house");
        assert_eq!(singularize("analysis"), "analysis");
    }
}
