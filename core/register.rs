use crate::error::{AppError, Result};
use crate::registry::InterpreterRegistry;
use std::time::Instant;

/// Something that persists metadata into an [`InterpreterRegistry`].
pub trait Registerable {
    fn registerable_name(&self) -> &'static str {
        "Unknown Registerable"
    }

    fn register(&self, registry: &dyn InterpreterRegistry) -> Result<bool> {
        let _ = registry;
        Err(AppError::NotImplemented(format!(
            "{} does not implement register()",
            self.registerable_name()
        )))
    }
}

/// Registers every item in order. Returns how many registrations succeeded.
pub fn register_all(
    label: &str,
    items: &[&dyn Registerable],
    registry: &dyn InterpreterRegistry,
) -> Result<usize> {
    log::info!("{}: Registering {} item(s)", label, items.len());
    let start = Instant::now();
    let mut registered = 0;
    for item in items {
        if item.register(registry)? {
            registered += 1;
        } else {
            log::warn!("{}: registration reported failure", item.registerable_name());
        }
    }
    log::info!(
        "{}: Registered {} of {} in {:.3} seconds",
        label,
        registered,
        items.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(registered)
}
