use crate::catalog::RegistryCatalog;

/// Where a /v2/ request goes: the exact upstream URL and the literal
/// upstream hostname the rewriter later matches redirects against.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTarget {
    pub url: String,
    pub host: String,
}

/// Registry API action segments, in match priority order.
const ACTION_SEGMENTS: [&str; 3] = ["manifests", "blobs", "tags"];

/// Resolve a path under /v2/ (prefix already stripped) to its upstream.
///
/// A first segment matching a catalog prefix token selects that registry
/// explicitly; everything else goes to the default registry (Docker Hub),
/// with single-name images normalized into the `library/` namespace.
/// Pure function of the path: no I/O, no state.
pub fn resolve(catalog: &RegistryCatalog, rest: &str) -> UpstreamTarget {
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(first) = segments.first()
        && let Some(registry) = catalog.by_prefix(first)
    {
        let remaining = segments[1..].join("/");
        return UpstreamTarget {
            url: format!("{}/v2/{}", registry.upstream, remaining),
            host: registry.host.clone(),
        };
    }

    let default = catalog.default_registry();
    let path = normalize_official_image(&segments);
    UpstreamTarget {
        url: format!("{}/v2/{}", default.upstream, path),
        host: default.host.clone(),
    }
}

/// Docker Hub stores official images under the implicit `library/`
/// namespace: `ubuntu/manifests/latest` means `library/ubuntu/...`.
/// Only a single image-name segment before the action segment gets the
/// prefix; zero or several pass through untouched, as do paths with no
/// action segment at all (the upstream returns its own error for those).
fn normalize_official_image(segments: &[&str]) -> String {
    let action_pos = ACTION_SEGMENTS
        .iter()
        .find_map(|action| segments.iter().position(|s| s == action));

    match action_pos {
        Some(1) => {
            let mut path = String::from("library/");
            path.push_str(&segments.join("/"));
            path
        }
        _ => segments.join("/"),
    }
}
