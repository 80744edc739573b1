/// One local path relayed to one upstream resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub local_path: String,
    pub upstream_url: String,
}

/// The fixed set of relayed paths, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable(Vec<ProxyRoute>);

// (local path, upstream resource)
const GROUPIE_ROUTES: [(&str, &str); 5] = [
    ("/api/artists-proxy", "artists"),
    ("/api/locations-proxy", "locations"),
    ("/api/dates-proxy", "dates"),
    ("/api/relations-proxy", "relation"),
    ("/api/relation-proxy", "relation"),
];

impl RouteTable {
    pub fn new(routes: Vec<ProxyRoute>) -> Self {
        Self(routes)
    }

    /// The Groupie Trackers resources, resolved against `upstream_base`.
    pub fn groupie(upstream_base: &str) -> Self {
        let base = upstream_base.trim_end_matches('/');

        Self::new(
            GROUPIE_ROUTES
                .iter()
                .map(|(local_path, resource)| ProxyRoute {
                    local_path: (*local_path).into(),
                    upstream_url: format!("{base}/{resource}"),
                })
                .collect(),
        )
    }

    pub fn find(&self, local_path: &str) -> Option<&ProxyRoute> {
        self.0.iter().find(|route| route.local_path == local_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyRoute> {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn both_relation_spellings_reach_the_same_resource() {
        let table = RouteTable::groupie("https://example.test/api/");

        let plural = table.find("/api/relations-proxy").unwrap();
        let singular = table.find("/api/relation-proxy").unwrap();

        assert_eq!(plural.upstream_url, "https://example.test/api/relation");
        assert_eq!(plural.upstream_url, singular.upstream_url);
    }

    #[test]
    fn unknown_paths_have_no_route() {
        let table = RouteTable::groupie("https://example.test/api");

        assert!(table.find("/api/artists").is_none());
        assert!(table.find("/api/artists-proxy/").is_none());
        assert_eq!(
            table.find("/api/dates-proxy").map(|r| r.upstream_url.as_str()),
            Some("https://example.test/api/dates")
        );
    }
}
