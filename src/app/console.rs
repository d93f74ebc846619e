use crate::core::favourites::{
    FailedToggle, FavouritesEvent, HEART_PRESSED, HEART_UNSAVEABLE_TIP, HeartButton, SyncController,
    ToggleOutcome,
};
use crate::core::identity::{IdentityError, IdentityProvider};
use crate::core::map::{FavouritesLayerToggle, LayerToggleOutcome};
use crate::core::places::{Coordinates, PlaceDraft, PlaceInput, RawFeature};
use anyhow::{Error, anyhow, bail};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const HELP: &str = "\
commands:
  signin <email> <password>
  signup <email> <password>
  signout
  whoami
  fav <name>|<address>|<lng>,<lat>
  feature <geojson feature>
  list
  check <key>
  layer
  retry
  quit";

/// User facing wording for identity failures
pub fn auth_hint(err: &IdentityError) -> String {
    match err {
        IdentityError::UserNotFound => {
            "We couldn't find that email. Create an account to continue.".to_string()
        }
        IdentityError::EmailInUse => "This email already exists. Please sign in.".to_string(),
        IdentityError::InvalidCredentials => "Wrong password. Try again.".to_string(),
        IdentityError::WeakPassword => "Password should be at least 6 characters.".to_string(),
        other => other.to_string(),
    }
}

/// `name|address|lng,lat`, any part may be left empty
fn parse_draft(args: &str) -> Result<PlaceDraft, Error> {
    let mut parts = args.splitn(3, '|').map(str::trim);
    let name = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    let address = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

    let coordinates = match parts.next().filter(|s| !s.is_empty()) {
        Some(raw) => {
            let (lng, lat) = raw
                .split_once(',')
                .ok_or_else(|| anyhow!("coordinates must be <lng>,<lat>"))?;
            Some(Coordinates::new(lng.trim().parse()?, lat.trim().parse()?))
        }
        None => None,
    };

    Ok(PlaceDraft {
        name,
        address,
        coordinates,
        ..Default::default()
    })
}

fn credentials(args: &str) -> Result<(&str, &str), Error> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [email, password] => Ok((*email, *password)),
        _ => bail!("expected <email> <password>"),
    }
}

/// Line oriented stand-in for the heart buttons, the layer menu and
/// the sign in modal
pub struct Console {
    identity: Arc<dyn IdentityProvider>,
    controller: Arc<SyncController>,
    layer: Arc<FavouritesLayerToggle>,
    hearts: Mutex<HashMap<String, Arc<HeartButton>>>,
    last_failed: Arc<Mutex<Option<FailedToggle>>>,
}

impl Console {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        controller: Arc<SyncController>,
        layer: Arc<FavouritesLayerToggle>,
    ) -> Self {
        Self {
            identity,
            controller,
            layer,
            hearts: Mutex::new(HashMap::new()),
            last_failed: Arc::new(Mutex::new(None)),
        }
    }

    /// Prints engine notifications and remembers the last failed toggle
    fn spawn_event_printer(&self) -> JoinHandle<()> {
        let mut rx = self.controller.events();
        let last_failed = self.last_failed.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(FavouritesEvent::Changed { items }) => {
                        println!("* {} favourites", items.len())
                    }
                    Ok(FavouritesEvent::Identity { identity }) => match identity {
                        Some(identity) => println!(
                            "* signed in as {}",
                            identity.email.as_deref().unwrap_or(&identity.uid)
                        ),
                        None => println!("* signed out"),
                    },
                    Ok(FavouritesEvent::SignInRequested) => {
                        println!("* sign in to save favourites (signin / signup)")
                    }
                    Ok(FavouritesEvent::ToggleFailed(failed)) => {
                        println!(
                            "* could not {} {}: {} (type retry)",
                            failed.intent, failed.place.name, failed.error
                        );
                        *last_failed.lock() = Some(failed);
                    }
                    Ok(FavouritesEvent::FeedFailed(err)) => {
                        println!("* favourites unavailable: {}", err)
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("Console missed {} events", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn run(self) -> Result<(), Error> {
        let printer = self.spawn_event_printer();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", HELP);

        while let Some(line) = lines.next_line().await? {
            match self.execute(line.trim()).await {
                Ok(Some(reply)) if !reply.is_empty() => println!("{}", reply),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => println!("error: {}", err),
            }
        }

        printer.abort();
        Ok(())
    }

    fn heart_for(&self, key: &str) -> Arc<HeartButton> {
        self.hearts
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| HeartButton::new(key))
            .clone()
    }

    async fn toggle(&self, input: PlaceInput) -> Result<String, Error> {
        let Some(place) = input.resolve() else {
            return Ok(HEART_UNSAVEABLE_TIP.to_string());
        };

        let heart = self.heart_for(&place.key);
        let Some(place) = self.controller.mount_heart(heart.clone(), &input) else {
            return Ok(heart.view().tip.unwrap_or_default());
        };

        let reply = match self.controller.toggle(&place).await? {
            ToggleOutcome::Added => format!("{} saved {}", heart.view().glyph, place.name),
            ToggleOutcome::Removed => format!("{} removed {}", heart.view().glyph, place.name),
            ToggleOutcome::SignInRequired => String::new(),
            ToggleOutcome::RolledBack(_) => String::new(),
            ToggleOutcome::Superseded(failed) => {
                debug!("Superseded toggle of {}", failed.place.key);
                String::new()
            }
        };

        Ok(reply)
    }

    /// Runs one command line. `None` asks the caller to stop.
    pub async fn execute(&self, line: &str) -> Result<Option<String>, Error> {
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));
        let args = args.trim();

        let reply = match command {
            "" => String::new(),
            "help" => HELP.to_string(),
            "quit" | "exit" => return Ok(None),
            "signin" | "signup" => {
                let (email, password) = credentials(args)?;
                let result = if command == "signin" {
                    self.identity.sign_in(email, password).await
                } else {
                    self.identity.sign_up(email, password).await
                };

                match result {
                    Ok(identity) => format!("welcome {}", identity.email.unwrap_or(identity.uid)),
                    Err(err) => auth_hint(&err),
                }
            }
            "signout" => {
                self.identity.sign_out().await?;
                String::new()
            }
            "whoami" => match self.identity.current() {
                Some(identity) => format!(
                    "{} ({})",
                    identity.email.as_deref().unwrap_or("no email"),
                    identity.uid
                ),
                None => "signed out".to_string(),
            },
            "fav" => self.toggle(PlaceInput::Draft(parse_draft(args)?)).await?,
            "feature" => {
                let feature: RawFeature = serde_json::from_str(args)?;
                self.toggle(PlaceInput::Feature(feature)).await?
            }
            "list" => {
                let favourites = self.controller.favourites();
                if favourites.is_empty() {
                    "no favourites".to_string()
                } else {
                    favourites
                        .iter()
                        .map(|f| format!("{} {}  {}  [{}]", HEART_PRESSED, f.name, f.address, f.key))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            "check" => match self.controller.is_saved_remotely(args).await? {
                Some(true) => format!("{} is stored", args),
                Some(false) => format!("{} is not stored", args),
                None => "signed out".to_string(),
            },
            "layer" => match self.layer.toggle() {
                LayerToggleOutcome::Shown => "favourites layer shown".to_string(),
                LayerToggleOutcome::Hidden => "favourites layer hidden".to_string(),
                LayerToggleOutcome::SignInRequired => {
                    self.layer.tip().unwrap_or_default().to_string()
                }
                LayerToggleOutcome::MapNotReady => "map not ready".to_string(),
            },
            "retry" => {
                let failed = self.last_failed.lock().take();
                match failed {
                    Some(failed) => match self.controller.retry(&failed).await? {
                        ToggleOutcome::Added | ToggleOutcome::Removed => {
                            format!("{} {}", failed.intent, failed.place.name)
                        }
                        _ => String::new(),
                    },
                    None => "nothing to retry".to_string(),
                }
            }
            other => format!("unknown command {}, try help", other),
        };

        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::favourites::{EventBus, MapSourceBinder};
    use crate::core::identity::LocalIdentityProvider;
    use crate::core::map::{MapSlot, MemoryMap};
    use crate::core::stores::MemoryFavouriteStore;
    use std::time::Duration;

    fn console() -> (Console, Arc<MemoryFavouriteStore>) {
        let store = Arc::new(MemoryFavouriteStore::new());
        let slot = Arc::new(MapSlot::default());
        slot.attach(Arc::new(
            MemoryMap::new()
                .with_source("favorites")
                .with_layer("favorites", true),
        ));

        let bus = EventBus::default();
        let controller = SyncController::new(
            store.clone(),
            MapSourceBinder::new(slot.clone(), "favorites"),
            bus.clone(),
        );
        let layer = FavouritesLayerToggle::new(slot, "favorites", bus.clone());
        layer.run(bus.subscribe());

        let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new());
        controller.bind_identity(identity.watch());

        (Console::new(identity, controller, layer), store)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn run(console: &Console, line: &str) -> String {
        console.execute(line).await.unwrap().unwrap()
    }

    #[test]
    fn test_parse_draft() {
        let draft = parse_draft("Café Nord | Sveavägen 1 | 18.07, 59.33").unwrap();
        assert_eq!(draft.name.as_deref(), Some("Café Nord"));
        assert_eq!(draft.address.as_deref(), Some("Sveavägen 1"));
        assert_eq!(draft.coordinates, Some(Coordinates::new(18.07, 59.33)));

        let draft = parse_draft("||").unwrap();
        assert_eq!(draft, PlaceDraft::default());

        assert!(parse_draft("a|b|18.07").is_err());
    }

    #[test]
    fn test_auth_hints() {
        assert_eq!(
            auth_hint(&IdentityError::UserNotFound),
            "We couldn't find that email. Create an account to continue."
        );
        assert_eq!(
            auth_hint(&IdentityError::WeakPassword),
            "Password should be at least 6 characters."
        );
    }

    #[tokio::test]
    async fn test_session_flow() {
        let (console, store) = console();

        assert_eq!(run(&console, "layer").await, "Sign in to save favourites");
        assert_eq!(run(&console, "fav Café Nord|Sveavägen 1|18.07,59.33").await, "");

        assert_eq!(
            run(&console, "signin a@b.se secret1").await,
            "We couldn't find that email. Create an account to continue."
        );
        assert_eq!(
            run(&console, "signup a@b.se 123").await,
            "Password should be at least 6 characters."
        );
        assert_eq!(run(&console, "signup a@b.se secret1").await, "welcome a@b.se");
        settle().await;

        assert_eq!(
            run(&console, "fav Café Nord|Sveavägen 1|18.07,59.33").await,
            "♥ saved Café Nord"
        );
        let uid = console.identity.current().unwrap().uid;
        assert_eq!(store.documents(&uid).len(), 1);
        assert!(run(&console, "list").await.contains("nameaddr|café nord|sveavägen 1"));
        assert_eq!(
            run(&console, "check nameaddr|café nord|sveavägen 1").await,
            "nameaddr|café nord|sveavägen 1 is stored"
        );

        assert_eq!(run(&console, "layer").await, "favourites layer hidden");

        run(&console, "signout").await;
        settle().await;
        assert_eq!(run(&console, "list").await, "no favourites");
        assert_eq!(run(&console, "whoami").await, "signed out");
        assert!(console.execute("quit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsaveable_feature() {
        let (console, _) = console();
        run(&console, "signup a@b.se secret1").await;
        settle().await;

        assert_eq!(
            run(&console, r#"feature {"properties":{"NAME":"Nowhere"}}"#).await,
            "Cannot save this place"
        );
    }
}
