//! Example plugin: prints every event it receives and answers `/echo` in groups.
//!
//! Build with `cargo build -p echo-plugin --release` and drop the resulting
//! shared library into the relay's plugin directory.

use std::thread::JoinHandle;

use amadeus_relay::declare_plugin;
use amadeus_relay::plugins::{Communication, Payload, Plugin};
use serde_json::json;

#[derive(Default)]
pub struct EchoPlugin {
    comm: Option<Communication>,
    listener: Option<JoinHandle<()>>,
}

impl EchoPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Reply for `/echo <text>` group messages
fn reply_for(event: &Payload) -> Option<Payload> {
    if event.get("message_type")?.as_str()? != "group" {
        return None;
    }
    let text = event.get("raw_message")?.as_str()?;
    let rest = text.strip_prefix("/echo ")?;
    Some(json!({
        "action": "send_group_msg",
        "params": {"group_id": event.get("group_id")?, "message": rest},
    }))
}

impl Plugin for EchoPlugin {
    fn set_communication(&mut self, comm: Communication) {
        if let Some(old) = self.comm.take() {
            old.close();
        }
        if let Some(previous) = self.listener.take() {
            let _ = previous.join();
        }

        let listener_comm = comm.clone();
        self.listener = Some(std::thread::spawn(move || {
            for event in listener_comm.receive() {
                println!("{}", event);
                if let Some(reply) = reply_for(&event) {
                    if listener_comm.send_blocking(reply).is_err() {
                        break;
                    }
                }
            }
        }));
        self.comm = Some(comm);
    }

    fn install(&mut self) {
        // Runs inside the host process but with its own copy of any logging statics.
        println!("echo plugin v{} installed", self.version());
    }

    fn uninstall(&mut self) {
        if let Some(comm) = self.comm.take() {
            comm.close();
        }
        // The library is unloaded after this returns; its thread must be gone by then.
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }
}

declare_plugin!(EchoPlugin::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_to_echo_command() {
        let event = json!({"message_type": "group", "group_id": 7, "raw_message": "/echo hi"});
        let reply = reply_for(&event).unwrap();
        assert_eq!(reply["action"], "send_group_msg");
        assert_eq!(reply["params"]["message"], "hi");
        assert_eq!(reply["params"]["group_id"], 7);
    }

    #[test]
    fn test_ignores_other_messages() {
        assert!(reply_for(&json!({"message_type": "private", "raw_message": "/echo hi"})).is_none());
        assert!(reply_for(&json!({"message_type": "group", "raw_message": "hello"})).is_none());
    }

    #[test]
    fn test_lifecycle_over_channel() {
        let (host, plugin_end) = Communication::pair(10);
        let mut plugin = EchoPlugin::new();
        plugin.set_communication(plugin_end);
        plugin.install();

        host.send_blocking(json!({"message_type": "group", "group_id": 1, "raw_message": "/echo pong"}))
            .unwrap();
        let reply = host.receive().next().unwrap();
        assert_eq!(reply["params"]["message"], "pong");

        plugin.uninstall();
        assert!(host.is_closed());
    }
}
