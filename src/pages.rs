use std::path::PathBuf;

use warp::http::Uri;
use warp::{Filter, Rejection, Reply};

const STATIC_CACHE: &str = "public, max-age=31536000";

/// Where the front-end lives on disk.
#[derive(Debug, Clone)]
pub struct Pages {
    pub static_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub index: PathBuf,
}

/// Front-end assets and pages. Files that don't exist reject as not found.
pub fn routes(pages: &Pages) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let assets = warp::path("static")
        .and(warp::fs::dir(pages.static_dir.clone()))
        .map(|file| warp::reply::with_header(file, "cache-control", STATIC_CACHE));

    // client-side routed
    let index = warp::path::end()
        .or(warp::path!("search"))
        .unify()
        .or(warp::path!("filters"))
        .unify()
        .and(warp::fs::file(pages.index.clone()));

    let templates = &pages.templates_dir;

    let search = warp::path!("search.html").and(warp::fs::file(templates.join("search.html")));

    let login = warp::path!("login")
        .or(warp::path!("login.html"))
        .unify()
        .and(warp::fs::file(templates.join("login.html")));

    let geoloc = warp::path!("geoloc.html").and(warp::fs::file(templates.join("geoloc.html")));

    // 301 Moved Permanently
    let geoloc_redirect = warp::path!("geoloc")
        .map(|| warp::redirect::redirect(Uri::from_static("/geoloc.html")));

    warp::get().and(
        assets
            .or(index)
            .or(search)
            .or(login)
            .or(geoloc)
            .or(geoloc_redirect),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;

    use uuid::Uuid;
    use warp::http::StatusCode;

    fn site() -> Pages {
        let root = std::env::temp_dir().join(format!("groupie-relay-site-{}", Uuid::new_v4()));
        let pages = Pages {
            static_dir: root.join("static"),
            templates_dir: root.join("templates"),
            index: root.join("index.html"),
        };

        fs::create_dir_all(pages.static_dir.join("css")).unwrap();
        fs::create_dir_all(&pages.templates_dir).unwrap();
        fs::write(pages.static_dir.join("css/style.css"), "body {}").unwrap();
        fs::write(pages.templates_dir.join("login.html"), "<h1>login</h1>").unwrap();
        fs::write(&pages.index, "<h1>index</h1>").unwrap();

        pages
    }

    #[tokio::test]
    async fn assets_are_cached() {
        let filter = routes(&site());

        let res = warp::test::request()
            .path("/static/css/style.css")
            .reply(&filter)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["cache-control"], STATIC_CACHE);
        assert_eq!(res.headers()["content-type"], "text/css");
        assert_eq!(res.body(), "body {}");
    }

    #[tokio::test]
    async fn spa_routes_serve_the_index() {
        let filter = routes(&site());

        for path in ["/", "/search", "/filters"] {
            let res = warp::test::request().path(path).reply(&filter).await;
            assert_eq!(res.body(), "<h1>index</h1>", "{path}");
        }
    }

    #[tokio::test]
    async fn login_has_two_spellings() {
        let filter = routes(&site());

        for path in ["/login", "/login.html"] {
            let res = warp::test::request().path(path).reply(&filter).await;
            assert_eq!(res.body(), "<h1>login</h1>", "{path}");
        }
    }

    #[tokio::test]
    async fn geoloc_redirects() {
        let filter = routes(&site());

        let res = warp::test::request().path("/geoloc").reply(&filter).await;

        assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.headers()["location"], "/geoloc.html");
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let filter = routes(&site());

        let res = warp::test::request()
            .path("/static/css/missing.css")
            .reply(&filter)
            .await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
