//! Network event bridge.
//!
//! The network stack raises events asynchronously (ESP-IDF event loop task,
//! simulator threads). They are funnelled through a single-consumer queue so
//! that the connection state machine sees them one at a time, in the order
//! they were raised, on the thread that waits for the connection outcome.

use log::debug;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

use crate::model::IpInfo;

/// Connectivity events for the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The Wi-Fi driver started in station mode.
    StationStarted,
    /// Link established with the access point; no address yet.
    StationConnected,
    /// Link lost or association attempt failed.
    StationDisconnected {
        /// 802.11 reason code, when the driver reports one.
        reason: Option<u16>,
    },
    /// An IPv4 address was assigned (DHCP lease or static configuration).
    GotIp(IpInfo),
}

/// Narrow interface implemented by anything that reacts to network events.
pub trait NetworkEventHandler {
    fn on_station_started(&mut self);

    fn on_station_connected(&mut self);

    fn on_station_disconnected(&mut self, reason: Option<u16>);

    fn on_ip_assigned(&mut self, info: IpInfo);

    /// Dispatch one event to the matching callback.
    fn handle(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::StationStarted => self.on_station_started(),
            NetworkEvent::StationConnected => self.on_station_connected(),
            NetworkEvent::StationDisconnected { reason } => self.on_station_disconnected(reason),
            NetworkEvent::GotIp(info) => self.on_ip_assigned(info),
        }
    }
}

/// Producer side of the bridge. Cheap to clone; safe to move into callbacks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<NetworkEvent>,
}

impl EventSender {
    /// Queue an event for the state machine.
    ///
    /// Returns `false` once the bridge has been closed. The event is dropped
    /// in that case: nothing is left to handle it.
    pub fn post(&self, event: NetworkEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!("Dropping {:?}: event bridge closed", event);
                false
            }
        }
    }
}

/// Consumer side of the bridge.
#[derive(Debug)]
pub struct EventBridge {
    rx: Receiver<NetworkEvent>,
}

impl EventBridge {
    /// Create a bridge and its first sender.
    pub fn new() -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, EventSender { tx })
    }

    /// Block for the next event.
    ///
    /// With a deadline, returns `None` once it passes. Without one, waits
    /// until an event arrives or every sender has been dropped.
    pub fn next(&self, deadline: Option<Instant>) -> Option<NetworkEvent> {
        match deadline {
            None => self.rx.recv().ok(),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(remaining) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        }
    }

    /// Take an already queued event without blocking.
    pub fn try_next(&self) -> Option<NetworkEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<&'static str>,
    }

    impl NetworkEventHandler for Recorder {
        fn on_station_started(&mut self) {
            self.seen.push("started");
        }

        fn on_station_connected(&mut self) {
            self.seen.push("connected");
        }

        fn on_station_disconnected(&mut self, _reason: Option<u16>) {
            self.seen.push("disconnected");
        }

        fn on_ip_assigned(&mut self, _info: IpInfo) {
            self.seen.push("got_ip");
        }
    }

    fn any_ip() -> IpInfo {
        IpInfo::new(
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(255, 0, 0, 0),
            Ipv4Addr::new(10, 0, 0, 1),
        )
    }

    #[test]
    fn test_events_delivered_in_order() {
        let (bridge, sender) = EventBridge::new();
        let producer = sender.clone();

        let handle = std::thread::spawn(move || {
            producer.post(NetworkEvent::StationStarted);
            producer.post(NetworkEvent::StationConnected);
            producer.post(NetworkEvent::StationDisconnected { reason: Some(201) });
            producer.post(NetworkEvent::GotIp(any_ip()));
        });
        handle.join().unwrap();

        let mut recorder = Recorder::default();
        while let Some(event) = bridge.try_next() {
            recorder.handle(event);
        }

        assert_eq!(
            recorder.seen,
            vec!["started", "connected", "disconnected", "got_ip"]
        );
        drop(sender);
    }

    #[test]
    fn test_next_times_out() {
        let (bridge, _sender) = EventBridge::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(bridge.next(Some(deadline)), None);
    }

    #[test]
    fn test_post_after_close_is_rejected() {
        let (bridge, sender) = EventBridge::new();
        assert!(sender.post(NetworkEvent::StationStarted));
        drop(bridge);
        assert!(!sender.post(NetworkEvent::StationStarted));
    }

    #[test]
    fn test_next_returns_none_when_all_senders_gone() {
        let (bridge, sender) = EventBridge::new();
        drop(sender);
        assert_eq!(bridge.next(None), None);
    }
}
