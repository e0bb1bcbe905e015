// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracks the set of known hubs across scan observations, evicts hubs
//! whose advertisements went silent, and remembers BLE devices that
//! turned out not to speak a usable protocol so the accessory transport
//! can claim them instead.
//!
//! The manager is an owned instance; embedders that want a process-wide
//! one can wrap it themselves.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::consts::{bleservice, LEGO_COMPANY_ID};
use crate::hubs::{Hub, HubEvent, HubState};

/// One advertisement as reported by an external scanner.
#[derive(Clone, Debug, Default)]
pub struct ScanObservation {
    pub identifier: String,
    pub name: Option<String>,
    pub services: Vec<Uuid>,
    /// Raw manufacturer data, company id first, little-endian.
    pub manufacturer_data: Vec<u8>,
    pub rssi: i16,
}

/// Whether an advertisement belongs to a LEGO hub: a known service, the
/// LEGO company id, or a telltale name.
pub fn is_lego_hub(observation: &ScanObservation) -> bool {
    if observation
        .services
        .iter()
        .any(|service| bleservice::KNOWN_LEGO_SERVICES.contains(service))
    {
        return true;
    }
    if observation.manufacturer_data.len() >= 2 {
        let company = u16::from_le_bytes([
            observation.manufacturer_data[0],
            observation.manufacturer_data[1],
        ]);
        if company == LEGO_COMPANY_ID {
            return true;
        }
    }
    observation
        .name
        .as_deref()
        .map(|name| {
            name.contains("LEGO") || name.contains("Technic") || name.contains("SPIKE")
        })
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Eviction sweep period (≈ 2 Hz).
    pub tick: Duration,
    /// How long a hub may go unseen before it is dropped.
    pub lost_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            lost_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ManagerEvent {
    HubDiscovered(String),
    HubUpdated(String),
    HubLost(String),
    /// The named hub exposed no protocol this engine speaks; it stays
    /// suppressed for BLE until forgotten.
    HubNotUsable(String),
}

/// Everything the manager knows about one identifier.
#[derive(Clone, Debug)]
pub struct KnownHub {
    pub identifier: String,
    pub name: String,
    pub rssi: i16,
    pub last_seen: Instant,
    pub hub: Option<Hub>,
}

impl KnownHub {
    fn is_connected(&self) -> bool {
        self.hub
            .as_ref()
            .map(|hub| {
                matches!(hub.state(), HubState::Connected | HubState::Connecting)
            })
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
pub struct HubManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    config: ManagerConfig,
    hubs: Mutex<BTreeMap<String, KnownHub>>,
    /// Identifiers that yielded `NoUsableProtocol` over BLE.
    suppressed: Mutex<HashSet<String>>,
    events: broadcast::Sender<ManagerEvent>,
    cancel: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for HubManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl HubManager {
    pub fn new(config: ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                hubs: Mutex::new(BTreeMap::new()),
                suppressed: Mutex::new(HashSet::new()),
                events,
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    /// Start the eviction sweep. Must run inside a tokio runtime.
    pub fn start(&self) {
        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.cancel).replace(token.clone()) {
            old.cancel();
        }
        let manager = self.clone();
        let tick = self.inner.config.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => manager.sweep(),
                }
            }
        });
    }

    pub fn stop(&self) {
        if let Some(token) = lock(&self.inner.cancel).take() {
            token.cancel();
        }
    }

    /// Feed one advertisement. Non-LEGO devices and suppressed
    /// identifiers are ignored.
    pub fn observe(&self, observation: ScanObservation) {
        if !is_lego_hub(&observation) {
            return;
        }
        if lock(&self.inner.suppressed).contains(&observation.identifier) {
            debug!(
                "Suppressed (no usable protocol): {}",
                observation.identifier
            );
            return;
        }

        let event = {
            let mut hubs = lock(&self.inner.hubs);
            match hubs.get_mut(&observation.identifier) {
                Some(known) => {
                    known.last_seen = Instant::now();
                    known.rssi = observation.rssi;
                    if let Some(name) = observation.name {
                        known.name = name;
                    }
                    ManagerEvent::HubUpdated(observation.identifier)
                }
                None => {
                    info!("Discovered hub {}", observation.identifier);
                    hubs.insert(
                        observation.identifier.clone(),
                        KnownHub {
                            identifier: observation.identifier.clone(),
                            name: observation.name.unwrap_or_default(),
                            rssi: observation.rssi,
                            last_seen: Instant::now(),
                            hub: None,
                        },
                    );
                    ManagerEvent::HubDiscovered(observation.identifier)
                }
            }
        };
        let _ = self.inner.events.send(event);
    }

    /// Attach a runtime to a known identifier (creating the entry if the
    /// hub arrived through the line transport without a scan). The
    /// manager watches it for `NoUsableProtocol`.
    pub fn register_hub(&self, hub: Hub) {
        let identifier = hub.identifier().to_string();
        {
            let mut hubs = lock(&self.inner.hubs);
            let entry = hubs.entry(identifier.clone()).or_insert_with(|| KnownHub {
                identifier: identifier.clone(),
                name: hub.name(),
                rssi: 0,
                last_seen: Instant::now(),
                hub: None,
            });
            entry.hub = Some(hub.clone());
        }

        let manager = self.clone();
        let mut events = hub.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    HubEvent::NoUsableProtocol => {
                        manager.mark_not_usable(&identifier);
                        break;
                    }
                    HubEvent::NameChanged(name) => {
                        let mut hubs = lock(&manager.inner.hubs);
                        if let Some(known) = hubs.get_mut(&identifier) {
                            known.name = name;
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    /// Remember that BLE is a dead end for this identifier and drop it
    /// from the list so a line transport can pick it up.
    pub fn mark_not_usable(&self, identifier: &str) {
        info!("No usable protocol on {}, suppressing BLE re-add", identifier);
        lock(&self.inner.suppressed).insert(identifier.to_string());
        let removed = lock(&self.inner.hubs).remove(identifier).is_some();
        if removed {
            let _ = self
                .inner
                .events
                .send(ManagerEvent::HubNotUsable(identifier.to_string()));
        }
    }

    pub fn is_suppressed(&self, identifier: &str) -> bool {
        lock(&self.inner.suppressed).contains(identifier)
    }

    pub fn forget_suppressed(&self, identifier: &str) {
        lock(&self.inner.suppressed).remove(identifier);
    }

    /// Known hubs, ordered by identifier.
    pub fn hubs(&self) -> Vec<KnownHub> {
        lock(&self.inner.hubs).values().cloned().collect()
    }

    pub fn get(&self, identifier: &str) -> Option<KnownHub> {
        lock(&self.inner.hubs).get(identifier).cloned()
    }

    /// Drop hubs whose advertisements went silent and which are not
    /// connected or connecting.
    fn sweep(&self) {
        let timeout = self.inner.config.lost_timeout;
        let lost: Vec<String> = {
            let mut hubs = lock(&self.inner.hubs);
            let lost: Vec<String> = hubs
                .values()
                .filter(|known| {
                    known.last_seen.elapsed() >= timeout && !known.is_connected()
                })
                .map(|known| known.identifier.clone())
                .collect();
            for identifier in &lost {
                hubs.remove(identifier);
            }
            lost
        };
        for identifier in lost {
            info!("Hub {} lost (advertisement silent)", identifier);
            let _ = self.inner.events.send(ManagerEvent::HubLost(identifier));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn observation(identifier: &str) -> ScanObservation {
        ScanObservation {
            identifier: identifier.to_string(),
            name: Some("Technic Hub".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn lego_identification() {
        // service match
        assert!(is_lego_hub(&ScanObservation {
            services: vec![*bleservice::LWP3_HUB],
            ..Default::default()
        }));
        assert!(is_lego_hub(&ScanObservation {
            services: vec![*bleservice::SPIKE_HUB],
            ..Default::default()
        }));
        assert!(is_lego_hub(&ScanObservation {
            services: vec![*bleservice::LEGACY_HUB],
            ..Default::default()
        }));
        // manufacturer id 0x0397, little-endian
        assert!(is_lego_hub(&ScanObservation {
            manufacturer_data: vec![0x97, 0x03, 0x00, 0x41],
            ..Default::default()
        }));
        assert!(!is_lego_hub(&ScanObservation {
            manufacturer_data: vec![0x03, 0x97],
            ..Default::default()
        }));
        // name heuristics
        for name in ["LEGO Hub", "Technic Hub", "SPIKE Prime"] {
            assert!(is_lego_hub(&ScanObservation {
                name: Some(name.to_string()),
                ..Default::default()
            }));
        }
        assert!(!is_lego_hub(&ScanObservation {
            name: Some("Fitness Tracker".to_string()),
            ..Default::default()
        }));
    }

    #[test]
    fn observation_list_is_ordered() {
        let manager = HubManager::default();
        manager.observe(observation("b"));
        manager.observe(observation("a"));
        manager.observe(observation("c"));
        let ids: Vec<String> =
            manager.hubs().into_iter().map(|h| h.identifier).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn non_lego_ignored() {
        let manager = HubManager::default();
        manager.observe(ScanObservation {
            identifier: "x".to_string(),
            name: Some("Toothbrush".to_string()),
            ..Default::default()
        });
        assert!(manager.hubs().is_empty());
    }

    #[test]
    fn suppression_blocks_re_add() {
        let manager = HubManager::default();
        manager.observe(observation("hub-1"));
        assert_eq!(manager.hubs().len(), 1);

        manager.mark_not_usable("hub-1");
        assert!(manager.is_suppressed("hub-1"));
        assert!(manager.hubs().is_empty());

        manager.observe(observation("hub-1"));
        assert!(manager.hubs().is_empty());

        manager.forget_suppressed("hub-1");
        manager.observe(observation("hub-1"));
        assert_eq!(manager.hubs().len(), 1);
    }

    #[tokio::test]
    async fn sweep_evicts_silent_hubs() {
        let manager = HubManager::new(ManagerConfig {
            tick: Duration::from_millis(10),
            lost_timeout: Duration::from_millis(40),
        });
        let mut events = manager.subscribe();
        manager.observe(observation("hub-1"));
        manager.start();

        // still advertised: keep refreshing, must survive
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            manager.observe(observation("hub-1"));
        }
        assert_eq!(manager.hubs().len(), 1);

        // silence: evicted after the timeout
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(manager.hubs().is_empty());
        manager.stop();

        let mut saw_lost = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ManagerEvent::HubLost(ref id) if id == "hub-1") {
                saw_lost = true;
            }
        }
        assert!(saw_lost);
    }
}
