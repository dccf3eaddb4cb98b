//! Redirects returned or thrown by loaders and actions.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::json;

use common::{counting, data, echo, redirect, respond, router_with_history, RecordingDocument};
use data_router::navigation::History;
use data_router::{
    FatalCause, FormData, HistoryAction, MemoryHistory, NavigateOptions, NavigationOutcome, Response, RouteDef,
    Router, RouterError, Submission,
};

#[tokio::test]
async fn test_loader_redirect_pushes_the_target_only() {
    let (router, history) = router_with_history(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("old").path("old").loader(|_| async { redirect("/new") }),
            RouteDef::new().id("new").path("new").loader(|_| async { data(json!("NEW")) }),
        ])],
        &["/"],
    );
    router.initialize().await.unwrap();

    let outcome = router.navigate("/old", NavigateOptions::default()).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Committed);

    let state = router.state();
    assert_eq!(state.location.pathname, "/new");
    assert_eq!(state.history_action, HistoryAction::Push);
    assert_eq!(state.loader_value("new"), Some(&json!("NEW")));
    let paths: Vec<String> = history.entries().into_iter().map(|l| l.pathname).collect();
    assert_eq!(paths, vec!["/", "/new"]);
}

#[tokio::test]
async fn test_307_keeps_method_and_body() {
    let (router, _) = router_with_history(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("submit").path("submit").action(|_| async {
                respond(Response::redirect_with_status("/target", StatusCode::TEMPORARY_REDIRECT))
            }),
            RouteDef::new().id("target").path("target").action(|args: data_router::HandlerArgs| async move {
                let name = args.request.form_data().and_then(|f| f.get("name")).map(str::to_string);
                data(json!({ "method": args.request.method.as_str(), "name": name }))
            }),
        ])],
        &["/"],
    );
    router.initialize().await.unwrap();

    let submission = Submission::form(Method::POST, FormData::new().with("name", "ada"));
    let outcome = router.navigate("/submit", NavigateOptions::submit(submission)).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Committed);

    let state = router.state();
    assert_eq!(state.location.pathname, "/target");
    let action_data = state.action_data.as_ref().unwrap();
    assert_eq!(action_data["target"], json!({ "method": "POST", "name": "ada" }));
}

#[tokio::test]
async fn test_303_after_post_loads_with_get() {
    let (router, _) = router_with_history(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("submit").path("submit").action(|_| async {
                respond(Response::redirect_with_status("/done", StatusCode::SEE_OTHER))
            }),
            RouteDef::new().id("done").path("done").loader(echo),
        ])],
        &["/"],
    );
    router.initialize().await.unwrap();

    let submission = Submission::form(Method::POST, FormData::new().with("a", "1"));
    router.navigate("/submit", NavigateOptions::submit(submission)).await.unwrap();

    let state = router.state();
    assert_eq!(state.location.pathname, "/done");
    assert_eq!(state.loader_value("done").unwrap()["method"], json!("GET"));
    assert!(state.action_data.is_none());
    assert!(state.navigation.is_idle());
}

#[tokio::test]
async fn test_redirect_to_current_location_replaces() {
    let (router, history) = router_with_history(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("home").path("home").loader(|_| async { data(json!("HOME")) }),
            RouteDef::new().id("bounce").path("bounce").loader(|_| async { redirect("/home") }),
        ])],
        &["/home"],
    );
    router.initialize().await.unwrap();

    router.navigate("/bounce", NavigateOptions::default()).await.unwrap();
    let state = router.state();
    assert_eq!(state.location.pathname, "/home");
    assert_eq!(state.history_action, HistoryAction::Replace);
    assert_eq!(history.entries().len(), 1);
}

#[tokio::test]
async fn test_search_and_hash_survive_redirects() {
    let (router, _) = router_with_history(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("from").path("from").loader(|_| async { redirect("/to?x=1#frag") }),
            RouteDef::new().id("to").path("to"),
        ])],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.navigate("/from", NavigateOptions::default()).await.unwrap();
    let location = router.state().location.clone();
    assert_eq!(location.pathname, "/to");
    assert_eq!(location.search, "?x=1");
    assert_eq!(location.hash, "#frag");
}

#[tokio::test]
async fn test_relative_redirect_resolves_against_the_route() {
    let (router, _) = router_with_history(
        vec![RouteDef::new().id("root").path("/").child(RouteDef::new().id("docs").path("docs").children([
            RouteDef::new().id("old").path("old").loader(|_| async { redirect("../new") }),
            RouteDef::new().id("new").path("new"),
        ]))],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.navigate("/docs/old", NavigateOptions::default()).await.unwrap();
    assert_eq!(router.state().location.pathname, "/docs/new");
}

#[tokio::test]
async fn test_root_relative_redirect_gets_the_basename() {
    let history = Arc::new(MemoryHistory::new(&["/app"]));
    let router = Router::builder()
        .basename("/app")
        .history(history.clone())
        .route(RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("private").path("private").loader(|_| async { redirect("/login") }),
            RouteDef::new().id("login").path("login"),
        ]))
        .build()
        .unwrap();
    router.initialize().await.unwrap();

    router.navigate("/private", NavigateOptions::default()).await.unwrap();
    assert_eq!(router.state().location.pathname, "/app/login");
    assert_eq!(history.location().pathname, "/app/login");
}

#[tokio::test]
async fn test_external_redirects_leave_the_application() {
    let document = Arc::new(RecordingDocument::default());
    let router = Router::builder()
        .history(Arc::new(MemoryHistory::new(&["/"])))
        .document_navigator(document.clone())
        .route(RouteDef::new().id("root").path("/").children([
            RouteDef::new()
                .id("away")
                .path("away")
                .loader(|_| async { redirect("https://example.com/landing") }),
            RouteDef::new()
                .id("legacy")
                .path("legacy")
                .loader(|_| async { respond(Response::redirect_document("/legacy.html")) }),
        ]))
        .build()
        .unwrap();
    router.initialize().await.unwrap();

    let outcome = router.navigate("/away", NavigateOptions::default()).await.unwrap();
    assert_eq!(
        outcome,
        NavigationOutcome::Redirected {
            href: "https://example.com/landing".into()
        }
    );
    let state = router.state();
    assert_eq!(state.location.pathname, "/");
    assert!(state.navigation.is_idle());

    router.navigate("/legacy", NavigateOptions::default()).await.unwrap();
    assert_eq!(
        *document.visits.lock(),
        vec![
            ("https://example.com/landing".to_string(), false),
            ("http://localhost/legacy.html".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_redirect_loop_hits_the_limit() {
    let router = Router::builder()
        .history(Arc::new(MemoryHistory::new(&["/"])))
        .max_redirects(3)
        .route(RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("ping").path("ping").loader(|_| async { redirect("/pong") }),
            RouteDef::new().id("pong").path("pong").loader(|_| async { redirect("/ping") }),
        ]))
        .build()
        .unwrap();
    router.initialize().await.unwrap();

    let outcome = router.navigate("/ping", NavigateOptions::default()).await.unwrap();
    let NavigationOutcome::Failed(fatal) = outcome else {
        panic!("expected the redirect limit, got {outcome:?}");
    };
    assert_eq!(fatal.error, FatalCause::Router(RouterError::RedirectLimit { limit: 3 }));
    assert_eq!(router.state().fatal_error.as_ref(), Some(&fatal));
    assert_eq!(router.state().location.pathname, "/");
}

#[tokio::test]
async fn test_revalidate_header_overrides_opt_outs() {
    let (root_loader, root_calls) = counting(json!("ROOT"));
    let (router, _) = router_with_history(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .loader(root_loader)
            .should_revalidate(|_| false)
            .children([
                RouteDef::new().id("a").path("a"),
                RouteDef::new().id("plain").path("plain").loader(|_| async { redirect("/a") }),
                RouteDef::new()
                    .id("forced")
                    .path("forced")
                    .loader(|_| async { respond(Response::redirect("/a").with_revalidate()) }),
            ])],
        &["/"],
    );
    router.initialize().await.unwrap();
    assert_eq!(root_calls.load(Ordering::SeqCst), 1);

    router.navigate("/plain", NavigateOptions::default()).await.unwrap();
    assert_eq!(router.state().location.pathname, "/a");
    assert_eq!(root_calls.load(Ordering::SeqCst), 1);

    router.navigate("/forced", NavigateOptions::default()).await.unwrap();
    assert_eq!(router.state().location.pathname, "/a");
    assert_eq!(root_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_non_redirect_3xx_is_data() {
    let (router, _) = router_with_history(
        vec![RouteDef::new().id("root").path("/").child(
            RouteDef::new()
                .id("cached")
                .path("cached")
                .loader(|_| async { respond(Response::with_status(StatusCode::NOT_MODIFIED, json!("same"))) }),
        )],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.navigate("/cached", NavigateOptions::default()).await.unwrap();
    let state = router.state();
    assert_eq!(state.location.pathname, "/cached");
    assert_eq!(state.loader_value("cached"), Some(&json!("same")));
}
