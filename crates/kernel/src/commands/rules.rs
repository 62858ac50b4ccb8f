//! Field rules shared by the page commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::definitions::DefinitionProvider;
use crate::error::ValidationErrors;

pub const TITLE_MAX: usize = 150;
pub const LAYOUT_NAME_MAX: usize = 100;
pub const SITE_NAME_MAX: usize = 50;
pub const HOST_MAX: usize = 100;
pub const SLUG_MAX: usize = 255;
pub const SITE_PATH_MAX: usize = 255;

#[allow(clippy::expect_used)]
static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid regex literal"));

#[allow(clippy::expect_used)]
static LAYOUT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9_.-]+$").expect("valid regex literal"));

#[allow(clippy::expect_used)]
static HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9]([a-z0-9.-]*[a-z0-9])?(:[0-9]+)?$").expect("valid regex literal")
});

/// Empty, or `/segment` repeated with no trailing slash.
#[allow(clippy::expect_used)]
static SITE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/[A-Za-z0-9_-]+)*$").expect("valid regex literal"));

pub fn check_slug(errors: &mut ValidationErrors, field: &str, slug: &str) {
    if slug.is_empty() {
        errors.add(field, format!("The {field} field is required."));
    } else if slug.len() > SLUG_MAX {
        errors.add(
            field,
            format!("The {field} may not be greater than {SLUG_MAX} characters."),
        );
    } else if !SLUG.is_match(slug) {
        errors.add(
            field,
            "The slug may only contain lowercase letters, numbers, hyphens and underscores.",
        );
    }
}

pub fn check_title(errors: &mut ValidationErrors, field: &str, title: &str) {
    if title.trim().is_empty() {
        errors.add(field, format!("The {field} field is required."));
    } else if title.chars().count() > TITLE_MAX {
        errors.add(
            field,
            format!("The {field} may not be greater than {TITLE_MAX} characters."),
        );
    }
}

/// Check a layout name's shape and that the layout is defined.
pub fn check_layout(
    errors: &mut ValidationErrors,
    definitions: &dyn DefinitionProvider,
    name: &str,
    version: i32,
) {
    let field = "layout_name";
    if name.is_empty() {
        errors.add(field, "The layout name is required.");
    } else if name.chars().count() > LAYOUT_NAME_MAX {
        errors.add(
            field,
            format!("The layout name may not be greater than {LAYOUT_NAME_MAX} characters."),
        );
    } else if !LAYOUT_NAME.is_match(name) {
        errors.add(field, "The layout name format is invalid.");
    } else if !definitions.layout_exists(name, version) {
        errors.add(field, format!("The layout {name}-v{version} does not exist."));
    }
}

pub fn check_site_name(errors: &mut ValidationErrors, name: &str) {
    if name.trim().is_empty() {
        errors.add("name", "The name field is required.");
    } else if name.chars().count() > SITE_NAME_MAX {
        errors.add(
            "name",
            format!("The name may not be greater than {SITE_NAME_MAX} characters."),
        );
    }
}

pub fn check_host(errors: &mut ValidationErrors, host: &str) {
    if host.is_empty() {
        errors.add("host", "The host field is required.");
    } else if host.len() > HOST_MAX || !HOST.is_match(host) {
        errors.add("host", "The host format is invalid.");
    }
}

pub fn check_site_path(errors: &mut ValidationErrors, path: &str) {
    if path.len() > SITE_PATH_MAX {
        errors.add(
            "path",
            format!("The path may not be greater than {SITE_PATH_MAX} characters."),
        );
    } else if !SITE_PATH.is_match(path) {
        errors.add(
            "path",
            "The path must be empty or a series of /segments of letters, numbers, \
             hyphens or underscores.",
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::definitions::{DefinitionRegistry, LayoutDefinition};

    fn check(f: impl Fn(&mut ValidationErrors)) -> bool {
        let mut errors = ValidationErrors::new();
        f(&mut errors);
        errors.is_empty()
    }

    #[test]
    fn slugs() {
        assert!(check(|e| check_slug(e, "slug", "about-us_2")));
        for bad in ["", "About", "a b", "a/b", "café"] {
            assert!(!check(|e| check_slug(e, "slug", bad)), "{bad:?}");
        }
    }

    #[test]
    fn slug_and_path_length_limits() {
        assert!(check(|e| check_slug(e, "slug", &"a".repeat(SLUG_MAX))));
        assert!(!check(|e| check_slug(e, "slug", &"a".repeat(SLUG_MAX + 1))));

        let mut errors = ValidationErrors::new();
        check_slug(&mut errors, "new_slug", &"a".repeat(300));
        assert_eq!(errors.get("new_slug").len(), 1);

        let longest = format!("/{}", "a".repeat(SITE_PATH_MAX - 1));
        assert!(check(|e| check_site_path(e, &longest)));
        let too_long = format!("/{}", "a".repeat(SITE_PATH_MAX));
        assert!(!check(|e| check_site_path(e, &too_long)));
    }

    #[test]
    fn titles() {
        assert!(check(|e| check_title(e, "title", "Home")));
        assert!(check(|e| check_title(e, "title", &"a".repeat(150))));
        assert!(!check(|e| check_title(e, "title", &"a".repeat(151))));
        assert!(!check(|e| check_title(e, "title", "  ")));
    }

    #[test]
    fn layouts_must_be_well_formed_and_defined() {
        let mut registry = DefinitionRegistry::new();
        registry.insert_layout(LayoutDefinition {
            name: "Two.Column".to_string(),
            version: 1,
            regions: Vec::new(),
        });
        assert!(check(|e| check_layout(e, &registry, "Two.Column", 1)));
        assert!(!check(|e| check_layout(e, &registry, "Two.Column", 2)));
        assert!(!check(|e| check_layout(e, &registry, "//£*", 1)));
        assert!(!check(|e| check_layout(e, &registry, "", 1)));
        assert!(!check(|e| check_layout(e, &registry, &"a".repeat(101), 1)));
    }

    #[test]
    fn site_paths() {
        for good in ["", "/food", "/one/two", "/A_b-1"] {
            assert!(check(|e| check_site_path(e, good)), "{good:?}");
        }
        for bad in ["/", "/foo/", "/foo/bar/", "foo", "foo/", "/@\""] {
            assert!(!check(|e| check_site_path(e, bad)), "{bad:?}");
        }
    }

    #[test]
    fn site_names_and_hosts() {
        assert!(check(|e| check_site_name(e, "A Valid Name")));
        assert!(!check(|e| check_site_name(e, "")));
        assert!(!check(|e| check_site_name(e, &"a".repeat(200))));

        assert!(check(|e| check_host(e, "example.com")));
        assert!(check(|e| check_host(e, "localhost:8080")));
        assert!(!check(|e| check_host(e, "")));
        assert!(!check(|e| check_host(e, &"/".repeat(200))));
    }
}
