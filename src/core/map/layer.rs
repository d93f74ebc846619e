use crate::core::favourites::{EventBus, FavouritesEvent};
use crate::core::identity::Identity;
use crate::core::map::MapSlot;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const SIGN_IN_TIP: &str = "Sign in to save favourites";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerToggleOutcome {
    Shown,
    Hidden,
    SignInRequired,
    MapNotReady,
}

/// The "favourites" entry of the layer menu. Disabled while signed out,
/// and the layer is forced hidden on sign out. Signing in never forces
/// it visible, the user's last choice stays.
pub struct FavouritesLayerToggle {
    slot: Arc<MapSlot>,
    layer_id: String,
    bus: EventBus,
    signed_in: AtomicBool,
}

impl FavouritesLayerToggle {
    pub fn new(slot: Arc<MapSlot>, layer_id: impl Into<String>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            slot,
            layer_id: layer_id.into(),
            bus,
            signed_in: AtomicBool::new(false),
        })
    }

    /// Follows identity notifications until the bus closes
    pub fn run(self: &Arc<Self>, mut rx: broadcast::Receiver<FavouritesEvent>) -> JoinHandle<()> {
        let toggle = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(FavouritesEvent::Identity { identity }) => {
                        toggle.on_identity(identity.as_ref())
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Layer toggle lagged behind {} favourites events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn on_identity(&self, identity: Option<&Identity>) {
        self.signed_in.store(identity.is_some(), Ordering::Release);

        if identity.is_some() {
            return;
        }

        let Some(map) = self.slot.get() else {
            return;
        };

        if map.layer_visible(&self.layer_id) == Some(true) {
            match map.set_layer_visible(&self.layer_id, false) {
                Ok(_) => debug!("Hid favourites layer after sign out"),
                Err(err) => warn!("Failed to hide favourites layer: {}", err),
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.signed_in.load(Ordering::Acquire)
    }

    /// Hint shown on the disabled menu entry
    pub fn tip(&self) -> Option<&'static str> {
        (!self.is_enabled()).then_some(SIGN_IN_TIP)
    }

    pub fn toggle(&self) -> LayerToggleOutcome {
        if !self.is_enabled() {
            self.bus.publish(FavouritesEvent::SignInRequested);
            return LayerToggleOutcome::SignInRequired;
        }

        let Some(map) = self.slot.get() else {
            return LayerToggleOutcome::MapNotReady;
        };

        let Some(visible) = map.layer_visible(&self.layer_id) else {
            return LayerToggleOutcome::MapNotReady;
        };

        if let Err(err) = map.set_layer_visible(&self.layer_id, !visible) {
            warn!("Failed to toggle favourites layer: {}", err);
            return LayerToggleOutcome::MapNotReady;
        }

        if visible {
            LayerToggleOutcome::Hidden
        } else {
            LayerToggleOutcome::Shown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::map::{MapSurface, MemoryMap};

    fn setup() -> (Arc<FavouritesLayerToggle>, Arc<MemoryMap>, EventBus) {
        let bus = EventBus::default();
        let map = Arc::new(MemoryMap::new().with_layer("favorites", false));
        let slot = Arc::new(MapSlot::default());
        slot.attach(map.clone());
        (FavouritesLayerToggle::new(slot, "favorites", bus.clone()), map, bus)
    }

    fn identity() -> Identity {
        Identity::new("U1", Some("u1@example.com".into()))
    }

    #[test]
    fn test_signed_out_requests_sign_in() {
        let (toggle, map, bus) = setup();
        let mut rx = bus.subscribe();

        assert_eq!(toggle.tip(), Some(SIGN_IN_TIP));
        assert_eq!(toggle.toggle(), LayerToggleOutcome::SignInRequired);
        assert_eq!(map.layer_visible("favorites"), Some(false));
        assert!(matches!(rx.try_recv(), Ok(FavouritesEvent::SignInRequested)));
    }

    #[test]
    fn test_toggle_when_signed_in() {
        let (toggle, map, _bus) = setup();
        toggle.on_identity(Some(&identity()));

        assert_eq!(toggle.tip(), None);
        assert_eq!(toggle.toggle(), LayerToggleOutcome::Shown);
        assert_eq!(map.layer_visible("favorites"), Some(true));
        assert_eq!(toggle.toggle(), LayerToggleOutcome::Hidden);
    }

    #[test]
    fn test_sign_out_hides_and_sign_in_keeps_choice() {
        let (toggle, map, _bus) = setup();
        toggle.on_identity(Some(&identity()));
        toggle.toggle();
        assert_eq!(map.layer_visible("favorites"), Some(true));

        toggle.on_identity(None);
        assert_eq!(map.layer_visible("favorites"), Some(false));

        toggle.on_identity(Some(&identity()));
        assert_eq!(map.layer_visible("favorites"), Some(false));
    }

    #[tokio::test]
    async fn test_follows_bus() {
        let (toggle, map, bus) = setup();
        let handle = toggle.run(bus.subscribe());

        bus.publish(FavouritesEvent::Identity {
            identity: Some(identity()),
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(toggle.is_enabled());
        toggle.toggle();

        bus.publish(FavouritesEvent::Identity { identity: None });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!toggle.is_enabled());
        assert_eq!(map.layer_visible("favorites"), Some(false));

        handle.abort();
    }
}
