//! Keyed fetchers: loads and submissions outside navigation.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use http::{Method, StatusCode};
use serde_json::json;

use common::{counting, data, echo, redirect, router, thrown, Controlled};
use data_router::deferred::defer;
use data_router::{
    FetchOptions, FetcherState, FormData, HandlerOutput, HandlerResult, NavigateOptions, RouteDef, RouteError,
    Submission,
};

fn post(key: &str, value: &str) -> Submission {
    Submission::form(Method::POST, FormData::new().with(key, value))
}

#[tokio::test]
async fn test_fetch_load_sets_data() {
    let (loader, calls) = counting(json!(["x", "y"]));
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .child(RouteDef::new().id("items").path("items").loader(loader))],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.fetch("list", "/items", FetchOptions::default()).await.unwrap();

    let fetcher = router.fetcher("list").unwrap();
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data, Some(json!(["x", "y"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let state = router.state();
    assert_eq!(state.location.pathname, "/");
    assert!(state.loader_data.get("items").is_none());
}

#[tokio::test]
async fn test_new_fetch_supersedes_the_old_one() {
    let loader = Controlled::new();
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .child(RouteDef::new().id("items").path("items").loader(loader.handler()))],
        &["/"],
    );
    router.initialize().await.unwrap();

    let first = tokio::spawn({
        let router = router.clone();
        async move { router.fetch("k", "/items?page=1", FetchOptions::default()).await }
    });
    loader.wait_calls(1).await;
    assert_eq!(router.fetcher("k").unwrap().state, FetcherState::Loading);

    let second = tokio::spawn({
        let router = router.clone();
        async move { router.fetch("k", "/items?page=2", FetchOptions::default()).await }
    });
    loader.wait_calls(2).await;
    assert!(loader.request(0).signal.is_aborted());
    assert_eq!(loader.request(1).url.query(), Some("page=2"));

    loader.resolve_data(1, json!("second"));
    second.await.unwrap().unwrap();
    loader.resolve_data(0, json!("first"));
    first.await.unwrap().unwrap();

    let fetcher = router.fetcher("k").unwrap();
    assert!(fetcher.is_idle());
    assert_eq!(fetcher.data, Some(json!("second")));
}

#[tokio::test]
async fn test_fetch_error_removes_fetcher_and_sets_boundary() {
    let router = router(
        vec![RouteDef::new().id("root").path("/").error_boundary(true).child(
            RouteDef::new()
                .id("items")
                .path("items")
                .loader(|_| async { thrown(StatusCode::BAD_REQUEST, json!("bad")) }),
        )],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.fetch("k", "/items", FetchOptions::default()).await.unwrap();

    assert!(router.fetcher("k").is_none());
    let state = router.state();
    assert_eq!(state.errors["root"].status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(state.location.pathname, "/");
}

#[tokio::test]
async fn test_fetch_without_match_is_404() {
    let router = router(vec![RouteDef::new().id("root").path("/").error_boundary(true)], &["/"]);
    router.initialize().await.unwrap();

    router.fetch("k", "/nowhere", FetchOptions::default()).await.unwrap();

    assert!(router.fetcher("k").is_none());
    assert_eq!(router.state().errors["root"].status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn test_fetch_submit_without_action_is_405() {
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .error_boundary(true)
            .child(RouteDef::new().id("items").path("items").loader(echo))],
        &["/"],
    );
    router.initialize().await.unwrap();

    router
        .fetch("k", "/items", FetchOptions::submit(post("a", "1")))
        .await
        .unwrap();

    assert!(router.fetcher("k").is_none());
    assert_eq!(
        router.state().errors["root"].status(),
        Some(StatusCode::METHOD_NOT_ALLOWED)
    );
}

#[tokio::test]
async fn test_fetch_submit_revalidates_before_going_idle() {
    let action = Controlled::new();
    let (root_loader, root_calls) = counting(json!("ROOT"));
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .loader(root_loader)
            .child(RouteDef::new().id("todos").path("todos").action(action.handler()))],
        &["/"],
    );
    router.initialize().await.unwrap();

    let submit = tokio::spawn({
        let router = router.clone();
        async move { router.fetch("add", "/todos", FetchOptions::submit(post("title", "milk"))).await }
    });
    action.wait_calls(1).await;
    let fetcher = router.fetcher("add").unwrap();
    assert_eq!(fetcher.state, FetcherState::Submitting);
    assert_eq!(fetcher.submission.as_ref().map(|s| s.form_method.clone()), Some(Method::POST));
    assert_eq!(action.request(0).form_data().and_then(|f| f.get("title")), Some("milk"));

    action.resolve_data(0, json!({ "id": 1 }));
    submit.await.unwrap().unwrap();

    let fetcher = router.fetcher("add").unwrap();
    assert!(fetcher.is_idle());
    assert_eq!(fetcher.data, Some(json!({ "id": 1 })));
    assert_eq!(root_calls.load(Ordering::SeqCst), 2);

    let state = router.state();
    assert!(state.navigation.is_idle());
    assert!(state.action_data.is_none());
}

#[tokio::test]
async fn test_fetch_redirect_navigates() {
    let router = router(
        vec![RouteDef::new().id("root").path("/").children([
            RouteDef::new().id("login").path("login").loader(|_| async { redirect("/welcome") }),
            RouteDef::new().id("welcome").path("welcome").loader(|_| async { data(json!("hi")) }),
        ])],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.fetch("session", "/login", FetchOptions::default()).await.unwrap();

    let state = router.state();
    assert_eq!(state.location.pathname, "/welcome");
    assert_eq!(state.loader_value("welcome"), Some(&json!("hi")));
    assert!(router.fetcher("session").unwrap().is_idle());
}

#[tokio::test]
async fn test_idle_fetchers_reload_on_revalidation() {
    let (items, item_calls) = counting(json!("items"));
    let (pinned, pinned_calls) = counting(json!("pinned"));
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .action(|_| async { data(json!(null)) })
            .children([
                RouteDef::new().id("items").path("items").loader(items),
                RouteDef::new()
                    .id("pinned")
                    .path("pinned")
                    .loader(pinned)
                    .should_revalidate(|_| false),
            ])],
        &["/"],
    );
    router.initialize().await.unwrap();
    router.fetch("items", "/items", FetchOptions::default()).await.unwrap();
    router.fetch("pinned", "/pinned", FetchOptions::default()).await.unwrap();

    router.revalidate().await.unwrap();

    assert_eq!(item_calls.load(Ordering::SeqCst), 2);
    assert_eq!(pinned_calls.load(Ordering::SeqCst), 1);
    assert!(router.fetcher("items").unwrap().is_idle());
    assert!(router.fetcher("pinned").unwrap().is_idle());

    router
        .navigate("/", NavigateOptions::submit(post("x", "1")))
        .await
        .unwrap();
    assert_eq!(item_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fetcher_resolves_deferred_payloads() {
    let router = router(
        vec![RouteDef::new().id("root").path("/").child(RouteDef::new().id("stats").path("stats").loader(|_| async {
            let payload = defer()
                .value("fast", json!(1))
                .pending("slow", async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, RouteError>(json!(2))
                })
                .build();
            HandlerResult::Ok(HandlerOutput::Deferred(payload))
        }))],
        &["/"],
    );
    router.initialize().await.unwrap();

    router.fetch("stats", "/stats", FetchOptions::default()).await.unwrap();
    assert_eq!(router.fetcher("stats").unwrap().data, Some(json!({ "fast": 1, "slow": 2 })));
}

#[tokio::test]
async fn test_relative_fetch_from_route() {
    let router = router(
        vec![RouteDef::new().id("root").path("/").child(
            RouteDef::new()
                .id("list")
                .path("list")
                .child(RouteDef::new().id("details").path("details").loader(echo)),
        )],
        &["/list"],
    );
    router.initialize().await.unwrap();

    router
        .fetch("d", "details", FetchOptions::default().from_route("list"))
        .await
        .unwrap();
    assert_eq!(router.fetcher("d").unwrap().data.unwrap()["path"], json!("/list/details"));
}

#[tokio::test]
async fn test_delete_fetcher() {
    let router = router(
        vec![RouteDef::new()
            .id("root")
            .path("/")
            .child(RouteDef::new().id("items").path("items").loader(|_| async { data(json!(1)) }))],
        &["/"],
    );
    router.initialize().await.unwrap();
    router.fetch("a", "/items", FetchOptions::default()).await.unwrap();
    router.fetch("b", "/items", FetchOptions::default()).await.unwrap();
    assert_eq!(router.fetchers().len(), 2);

    router.delete_fetcher("a");
    assert!(router.fetcher("a").is_none());
    assert_eq!(router.fetchers().keys().collect::<Vec<_>>(), vec!["b"]);
}

#[tokio::test]
async fn test_later_fetch_outlives_the_earlier_submit_revalidation() {
    let root = Controlled::new();
    let todos = Controlled::new();
    let router = router(
        vec![RouteDef::new().id("root").path("/").loader(root.handler()).child(
            RouteDef::new()
                .id("todos")
                .path("todos")
                .loader(todos.handler())
                .action(|_| async { data(json!("acted")) }),
        )],
        &["/"],
    );
    let init = tokio::spawn({
        let router = router.clone();
        async move { router.initialize().await }
    });
    root.wait_calls(1).await;
    root.resolve_data(0, json!("ROOT"));
    init.await.unwrap().unwrap();

    let submit = tokio::spawn({
        let router = router.clone();
        async move { router.fetch("k", "/todos", FetchOptions::submit(post("title", "milk"))).await }
    });
    root.wait_calls(2).await;

    let load = tokio::spawn({
        let router = router.clone();
        async move { router.fetch("k", "/todos", FetchOptions::default()).await }
    });
    todos.wait_calls(1).await;

    root.resolve_data(1, json!("ROOT again"));
    submit.await.unwrap().unwrap();
    assert_eq!(router.fetcher("k").unwrap().state, FetcherState::Loading);

    todos.resolve_data(0, json!("LATEST"));
    load.await.unwrap().unwrap();
    let fetcher = router.fetcher("k").unwrap();
    assert!(fetcher.is_idle());
    assert_eq!(fetcher.data, Some(json!("LATEST")));
}
