//! Form state persisted to disk through decorated initializers
//!
//! Run it twice: the second run starts from the values saved by the first.

use serde::{Deserialize, Serialize};
use stashbox::middleware::{logger, persist, FileStorage, Persist, PersistOptions};
use stashbox::{create_store, Merge, Setter};
use std::fmt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type TextAction = Arc<dyn Fn(&str) + Send + Sync>;

struct Form {
    aaa: String,
    bbb: String,
    update_aaa: TextAction,
    update_bbb: TextAction,
}

#[derive(Default, Serialize, Deserialize)]
struct FormData {
    aaa: Option<String>,
    bbb: Option<String>,
}

impl Merge for Form {
    type Patch = FormData;

    fn merge(&self, patch: FormData) -> Self {
        Self {
            aaa: patch.aaa.unwrap_or_else(|| self.aaa.clone()),
            bbb: patch.bbb.unwrap_or_else(|| self.bbb.clone()),
            update_aaa: Arc::clone(&self.update_aaa),
            update_bbb: Arc::clone(&self.update_bbb),
        }
    }
}

impl Persist for Form {
    type Persisted = FormData;

    fn persisted(&self) -> FormData {
        FormData {
            aaa: Some(self.aaa.clone()),
            bbb: Some(self.bbb.clone()),
        }
    }

    fn rehydrate(persisted: FormData) -> FormData {
        persisted
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("aaa", &self.aaa)
            .field("bbb", &self.bbb)
            .finish_non_exhaustive()
    }
}

fn form(set: Setter<Form>) -> Form {
    let set_bbb = set.clone();
    Form {
        aaa: String::new(),
        bbb: String::new(),
        update_aaa: Arc::new(move |value: &str| {
            set.patch(FormData {
                aaa: Some(value.to_string()),
                bbb: None,
            })
        }),
        update_bbb: Arc::new(move |value: &str| {
            set_bbb.patch(FormData {
                aaa: None,
                bbb: Some(value.to_string()),
            })
        }),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    println!("=== Persisted Form ===\n");

    let dir = std::env::temp_dir().join("stashbox-demo");
    let options = PersistOptions::new("test_persist", Arc::new(FileStorage::new(&dir)));
    let store = create_store(logger(persist(|set, _get, _api| form(set), options)));

    let state = store.get_state();
    println!("1. Loaded from {}", dir.display());
    println!("   aaa = {:?}, bbb = {:?}", state.aaa, state.bbb);

    store.subscribe(|next, _previous| {
        println!("   [Store] aaa = {:?}, bbb = {:?}", next.aaa, next.bbb);
    });

    println!("\n2. Typing into the first field");
    let update_aaa = store.get_state().update_aaa.clone();
    let typed = format!("{}!", state.aaa);
    update_aaa(&typed);

    println!("\n3. Typing into the second field");
    (store.get_state().update_bbb)("saved");

    println!("\n✓ Example complete! Run again to see the restored values.");
}
