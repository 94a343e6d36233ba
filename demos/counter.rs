//! Counter component driven by a bound store hook

use stashbox::runtime::RenderRuntime;
use stashbox::{create_bound_hook, Merge, Setter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type Action = Arc<dyn Fn() + Send + Sync>;

struct Counter {
    count: i32,
    step: i32,
    increase: Action,
    decrease: Action,
}

#[derive(Default)]
struct CounterPatch {
    count: Option<i32>,
    step: Option<i32>,
}

impl Merge for Counter {
    type Patch = CounterPatch;

    fn merge(&self, patch: CounterPatch) -> Self {
        Self {
            count: patch.count.unwrap_or(self.count),
            step: patch.step.unwrap_or(self.step),
            increase: Arc::clone(&self.increase),
            decrease: Arc::clone(&self.decrease),
        }
    }
}

fn counter(set: Setter<Counter>) -> Counter {
    let down = set.clone();
    Counter {
        count: 0,
        step: 1,
        increase: Arc::new(move || {
            set.patch_with(|s: &Counter| CounterPatch {
                count: Some(s.count + s.step),
                ..Default::default()
            })
        }),
        decrease: Arc::new(move || {
            down.patch_with(|s: &Counter| CounterPatch {
                count: Some(s.count - s.step),
                ..Default::default()
            })
        }),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Counter Component ===\n");

    let use_counter = create_bound_hook(|set, _get, _api| counter(set));

    // Imperative subscriber outside of rendering
    use_counter.subscribe(|next, previous| {
        println!("   [Store] count {} -> {}", previous.count, next.count);
    });

    let scheduled = Arc::new(AtomicBool::new(false));
    let component = RenderRuntime::with_scheduler({
        let scheduled = scheduled.clone();
        move || scheduled.store(true, Ordering::SeqCst)
    });

    let render = || {
        component.render(|| {
            let count = use_counter.use_selector(|s| s.count)?;
            let step = use_counter.use_selector(|s| s.step)?;
            Ok::<_, stashbox::BindingError>(format!("Count: {count} (step {step})"))
        })
    };

    println!("1. First render");
    match render() {
        Ok(view) => println!("   {view}"),
        Err(e) => eprintln!("   render failed: {e}"),
    }

    println!("\n2. Clicking increase three times");
    for _ in 0..3 {
        (use_counter.get_state().increase)();
        if scheduled.swap(false, Ordering::SeqCst) {
            if let Ok(view) = render() {
                println!("   {view}");
            }
        }
    }

    println!("\n3. Changing step to 5 and decreasing");
    use_counter.set_patch(CounterPatch {
        step: Some(5),
        ..Default::default()
    });
    (use_counter.get_state().decrease)();
    if scheduled.swap(false, Ordering::SeqCst) {
        if let Ok(view) = render() {
            println!("   {view}");
        }
    }

    println!("\n4. Tearing down");
    component.unmount();
    use_counter.destroy();
    (use_counter.get_state().increase)();
    println!("   Final count (no listeners left): {}", use_counter.get_state().count);
    println!("   Renders: {}", component.render_count());

    println!("\n✓ Example complete!");
}
