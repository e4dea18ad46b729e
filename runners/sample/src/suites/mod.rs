pub mod arithmetic;
pub mod session;

use cactus::{Suite, TestRegistry};

/// Registers the sample test classes and returns the suites running them.
pub fn register(registry: &mut TestRegistry) -> Vec<Suite> {
    let session = registry.register(session::class());
    let arithmetic = registry.register(arithmetic::class());
    vec![
        Suite::from_class(
            &session,
            "Runs test methods with begin and end hooks inside the container: request
        parameters, sessions, simulated URLs and raw responses.",
        ),
        Suite::wrapped(
            &arithmetic,
            "Runs a plain test class inside the container without rewriting it.",
        ),
    ]
}
