//! Integration tests for the tank server
//!
//! These tests validate cross-component interactions and real network behavior.

use futures_util::{SinkExt, StreamExt};
use server::identity::IdentityAllocator;
use server::registry::SessionHandle;
use server::scheduler::TickScheduler;
use server::world::{World, WorldConfig, WorldSnapshot};
use server::{Coordinator, FileStore, MemoryStore, Server, ServerConfig};
use rust_decimal::Decimal;
use shared::{Inbound, Outbound};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn printed(messages: &[Outbound]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            Outbound::Print { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// COORDINATOR TESTS
mod coordinator_tests {
    use super::*;

    fn coordinator() -> Coordinator {
        Coordinator::with_default_menus(
            World::restore(WorldConfig::default(), WorldSnapshot::default()).unwrap(),
            TickScheduler::new(Duration::from_millis(250), 4).unwrap(),
            IdentityAllocator::seeded(21),
            8,
        )
        .unwrap()
    }

    /// Two sessions: one splits the organism, the other hears about it
    #[test]
    fn split_is_seen_by_everyone() {
        let mut coordinator = coordinator();
        let (h1, mut rx1) = SessionHandle::channel();
        let (h2, mut rx2) = SessionHandle::channel();
        let alice = coordinator.connect(h1).unwrap().unwrap();
        let _bob = coordinator.connect(h2).unwrap().unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        // main -> organisms -> organism #1 -> split
        for key in ["1", "0", "0"] {
            coordinator.enqueue(alice, key.to_string());
            coordinator.tick();
        }

        let name = coordinator.registry().get(alice).unwrap().name.clone();
        let expected = format!("{} split organism #1, making #2.\n", name);
        assert!(printed(&drain(&mut rx2)).contains(&expected));
        assert!(printed(&drain(&mut rx1)).contains("Organism #1: mass 0.50"));
        assert_eq!(coordinator.world().organism_count(), 2);
        assert_eq!(coordinator.world().total_organism_mass(), Decimal::ONE);
    }

    /// Every input queued before a tick is handled within that tick
    #[test]
    fn tick_drains_everything_queued() {
        let mut coordinator = coordinator();
        let (handle, mut rx) = SessionHandle::channel();
        let id = coordinator.connect(handle).unwrap().unwrap();
        drain(&mut rx);

        for _ in 0..5 {
            coordinator.enqueue(id, "3".to_string());
        }
        let report = coordinator.tick();

        assert_eq!(report.dispatched, 5);
        assert_eq!(coordinator.pending_inputs(), 0);
        assert_eq!(drain(&mut rx).len(), 5);
    }

    /// Mass only enters the tank through spawns and never passes the ceiling
    #[test]
    fn economy_conserves_mass() {
        let mut coordinator = coordinator();
        let ceiling = coordinator.world().config().tank_ceiling;

        let mut expected = coordinator.world().total_mass();
        let mut advances = 0;
        for _ in 0..1000 {
            let report = coordinator.tick();
            if let Some(economy) = report.economy {
                advances += 1;
                expected += economy.food_spawned;
            }
            assert!(coordinator.world().total_mass() <= ceiling);
        }

        assert_eq!(advances, 250);
        assert_eq!(coordinator.world().total_mass(), expected);
        assert_eq!(coordinator.world().total_mass(), ceiling);
        assert!(coordinator.world().organisms().any(|o| o.mass > Decimal::ONE));
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            port: 0,
            tick: Duration::from_millis(10),
            economy_every: 10_000,
            seed: Some(99),
            ..ServerConfig::default()
        }
    }

    async fn next_message(client: &mut Client) -> Option<Outbound> {
        loop {
            let frame = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for server")?;
            match frame {
                Ok(Message::Text(text)) => return Some(Outbound::decode(&text).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    async fn next_print(client: &mut Client) -> String {
        match next_message(client).await {
            Some(Outbound::Print { content }) => content,
            other => panic!("expected a print, got {:?}", other),
        }
    }

    async fn send(client: &mut Client, message: &str) {
        client.send(Message::Text(message.to_string())).await.unwrap();
    }

    /// Full round trip over a real WebSocket
    #[tokio::test]
    async fn websocket_session_round_trip() {
        let server = Server::new(config(), MemoryStore::new()).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let client = async move {
            let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
            assert!(next_print(&mut ws).await.starts_with("Welcome to the tank, Guest"));

            send(&mut ws, &Inbound::RequestState.encode()).await;
            assert_eq!(next_message(&mut ws).await, Some(Outbound::ClearChoices));
            assert_eq!(next_print(&mut ws).await, "What would you like to do?\n");
            for (index, label) in ["Look into the tank", "Inspect organisms", "Drop food", "Who is here?"]
                .iter()
                .enumerate()
            {
                assert_eq!(next_message(&mut ws).await, Some(Outbound::choice(index, *label)));
            }

            // Browser peers send the index as a number
            send(&mut ws, r#"{"messageType":"keyPress","key":0}"#).await;
            assert!(next_print(&mut ws)
                .await
                .starts_with("The tank holds 1 organisms (1.00) and 0 food items"));

            send(&mut ws, r#"{"messageType":"keyPress","key":"abc"}"#).await;
            assert_eq!(next_print(&mut ws).await, "Invalid choice.\n");

            // Garbage and keyless frames are ignored
            send(&mut ws, "not json").await;
            send(&mut ws, r#"{"messageType":"keyPress"}"#).await;
            send(&mut ws, r#"{"messageType":"keyPress","key":"3"}"#).await;
            assert!(next_print(&mut ws).await.starts_with("Here now: Guest"));

            assert_ok!(ws.close(None).await);
            assert_ok!(stop_tx.send(()));
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let (store, ()) = tokio::join!(server.run_until(shutdown), client);
        let store = store.unwrap();
        assert!(store.is_closed());
        assert_eq!(store.saves(), 1);
    }

    /// Arrivals and departures are announced to the others
    #[tokio::test]
    async fn arrivals_and_departures_are_broadcast() {
        let server = Server::new(config(), MemoryStore::new()).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let clients = async move {
            let (mut first, _) = connect_async(url.as_str()).await.unwrap();
            next_print(&mut first).await;

            let (mut second, _) = connect_async(url.as_str()).await.unwrap();
            let greeting = next_print(&mut second).await;
            let name = greeting
                .trim_start_matches("Welcome to the tank, ")
                .trim_end_matches(".\n")
                .to_string();

            assert_eq!(
                next_print(&mut first).await,
                format!("{} has entered the tank.\n", name)
            );

            second.close(None).await.unwrap();
            assert_eq!(
                next_print(&mut first).await,
                format!("{} has left the tank.\n", name)
            );

            stop_tx.send(()).unwrap();
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let (result, ()) = tokio::join!(server.run_until(shutdown), clients);
        result.unwrap();
    }

    /// Connections over the limit are told why and closed
    #[tokio::test]
    async fn full_server_turns_clients_away() {
        let config = ServerConfig {
            max_clients: 1,
            ..config()
        };
        let server = Server::new(config, MemoryStore::new()).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let clients = async move {
            let (mut first, _) = connect_async(url.as_str()).await.unwrap();
            next_print(&mut first).await;

            let (mut second, _) = connect_async(url.as_str()).await.unwrap();
            assert_eq!(
                next_print(&mut second).await,
                "The tank is crowded; try again later.\n"
            );
            assert_eq!(next_message(&mut second).await, None);

            stop_tx.send(()).unwrap();
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let (result, ()) = tokio::join!(server.run_until(shutdown), clients);
        result.unwrap();
    }

    /// The world survives a restart through the file store
    #[tokio::test]
    async fn file_store_survives_restart() {
        let path = std::env::temp_dir().join(format!("fishtank-restart-{}.bin", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let server = Server::new(config(), FileStore::new(&path)).await.unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let url = format!("ws://{}", server.local_addr());

        let client = async move {
            let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
            next_print(&mut ws).await;
            send(&mut ws, r#"{"messageType":"keyPress","key":2}"#).await;
            assert!(next_print(&mut ws).await.contains("dropped 1.00 food"));
            stop_tx.send(()).unwrap();
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };
        let (result, ()) = tokio::join!(server.run_until(shutdown), client);
        result.unwrap();

        let restarted = Server::new(config(), FileStore::new(&path)).await.unwrap();
        let world = restarted.coordinator().world();
        assert_eq!(world.organism_count(), 1);
        assert_eq!(world.food_count(), 1);
        assert_eq!(world.total_mass(), Decimal::from(2));

        std::fs::remove_file(&path).unwrap();
    }
}
