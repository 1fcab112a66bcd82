//! Plugin service tests: forwarders across load, reload and unload, and
//! directory loading
//! Run with: cargo test --test plugin_service_test

mod common;

use std::sync::Arc;
use std::time::Duration;

use amadeus_relay::application::services::PluginService;
use amadeus_relay::plugins::{Communication, PluginManager};
use common::{create_recording, last_comm, next_plugin, Entry, MockBot, StubLoader};
use serde_json::json;

fn service(loader: &Arc<StubLoader>, bot: &MockBot) -> PluginService<MockBot> {
    let manager = Arc::new(PluginManager::with_loader(loader.clone(), 10));
    PluginService::new(manager, bot.clone())
}

fn group_request(text: &str) -> serde_json::Value {
    json!({"action": "send_group_msg", "params": {"group_id": 1, "message": text}})
}

async fn wait_for_requests(bot: &MockBot, count: usize) {
    for _ in 0..100 {
        if bot.sent().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} requests, got {}", count, bot.sent().len());
}

async fn send(end: &Communication, text: &str) {
    end.send(group_request(text)).await.unwrap();
}

#[tokio::test]
async fn test_loaded_plugin_requests_reach_bot() {
    let loader = StubLoader::new();
    loader.register("/plugins/libalpha.so", Entry::Plugin(create_recording));
    let bot = MockBot::default();
    let service = service(&loader, &bot);

    next_plugin("alpha", "1.0.0");
    service.load("/plugins/libalpha.so").unwrap();
    assert_eq!(service.forwarding(), vec!["alpha".to_string()]);

    let end = last_comm().unwrap();
    send(&end, "first").await;
    end.send(json!("not a request")).await.unwrap();
    send(&end, "second").await;
    wait_for_requests(&bot, 2).await;

    let messages: Vec<_> = bot
        .sent()
        .into_iter()
        .map(|r| r.params["message"].clone())
        .collect();
    assert_eq!(messages, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn test_reload_moves_forwarding_to_new_channel() {
    let loader = StubLoader::new();
    loader.register("/plugins/libalpha.so", Entry::Plugin(create_recording));
    loader.register("/plugins/libalpha-2.so", Entry::Plugin(create_recording));
    let bot = MockBot::default();
    let service = service(&loader, &bot);

    next_plugin("alpha", "1.0.0");
    service.load("/plugins/libalpha.so").unwrap();
    let old_end = last_comm().unwrap();
    send(&old_end, "before").await;
    wait_for_requests(&bot, 1).await;

    next_plugin("alpha", "2.0.0");
    service.reload("alpha", "/plugins/libalpha-2.so").await.unwrap();
    let new_end = last_comm().unwrap();

    // The old forwarder was joined; its channel no longer accepts requests
    assert!(old_end.try_send(group_request("stale")).is_err());
    assert_eq!(service.forwarding(), vec!["alpha".to_string()]);

    send(&new_end, "after").await;
    wait_for_requests(&bot, 2).await;

    let messages: Vec<_> = bot
        .sent()
        .into_iter()
        .map(|r| r.params["message"].clone())
        .collect();
    assert_eq!(messages, vec![json!("before"), json!("after")]);
}

#[tokio::test]
async fn test_unload_stops_forwarder() {
    let loader = StubLoader::new();
    loader.register("/plugins/libalpha.so", Entry::Plugin(create_recording));
    let bot = MockBot::default();
    let service = service(&loader, &bot);

    next_plugin("alpha", "1.0.0");
    service.load("/plugins/libalpha.so").unwrap();
    service.unload("alpha").await.unwrap();

    assert!(service.forwarding().is_empty());
    assert!(service.manager().is_empty());
    assert!(service.unload("alpha").await.is_err());
}

#[tokio::test]
async fn test_reload_all_restarts_every_plugin() {
    let loader = StubLoader::new();
    loader.register("/plugins/liba.so", Entry::Plugin(create_recording));
    loader.register("/plugins/libb.so", Entry::Plugin(create_recording));
    let bot = MockBot::default();
    let service = service(&loader, &bot);

    next_plugin("a", "1.0.0");
    service.load("/plugins/liba.so").unwrap();
    let a_before = last_comm().unwrap();
    next_plugin("b", "1.0.0");
    service.load("/plugins/libb.so").unwrap();

    // Every reload on this thread now creates "b"; the registry keys stay put
    let reloaded = service.reload_all().await;

    assert_eq!(reloaded, vec!["a".to_string(), "b".to_string()]);
    assert!(a_before.is_closed());
    assert_eq!(service.forwarding(), vec!["a".to_string(), "b".to_string()]);

    send(&last_comm().unwrap(), "after reload").await;
    wait_for_requests(&bot, 1).await;
}

#[tokio::test]
async fn test_load_directory_skips_bad_libraries() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("libbroken.so"), b"not a shared library").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let service = PluginService::new(Arc::new(PluginManager::default()), MockBot::default());

    assert!(service.load_directory(dir.path()).is_empty());
    assert!(service.manager().is_empty());
    assert!(service.forwarding().is_empty());
}

#[tokio::test]
async fn test_load_directory_missing_dir() {
    let service = PluginService::new(Arc::new(PluginManager::default()), MockBot::default());
    let dir = tempfile::tempdir().unwrap();

    assert!(service.load_directory(dir.path().join("absent")).is_empty());
}
