use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::class::TestClass;
use crate::error::{CactusError, Result};

/// Test classes known by name.
#[derive(Debug, Default)]
pub struct TestRegistry {
    classes: HashMap<String, Arc<TestClass>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, replacing any class of the same name.
    pub fn register(&mut self, class: TestClass) -> Arc<TestClass> {
        let class = Arc::new(class);
        self.classes.insert(class.name().to_string(), class.clone());
        class
    }

    pub fn register_shared(&mut self, class: Arc<TestClass>) {
        self.classes.insert(class.name().to_string(), class);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TestClass>> {
        self.classes.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Resolves class names against the application's own registry first, then
/// against the registry of the calling context, so the framework can be
/// shared between applications that each register their own classes.
#[derive(Clone, Debug)]
pub struct ClassLoader {
    application: Arc<TestRegistry>,
    context: Option<Arc<TestRegistry>>,
}

impl ClassLoader {
    pub fn new(application: Arc<TestRegistry>) -> Self {
        Self {
            application,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Arc<TestRegistry>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn load(&self, name: &str) -> Result<Arc<TestClass>> {
        if let Some(class) = self.application.get(name) {
            return Ok(class);
        }
        if let Some(class) = self.context.as_ref().and_then(|context| context.get(name)) {
            debug!(class = name, "loaded from context registry");
            return Ok(class);
        }
        Err(CactusError::ClassNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::class::TestClassBuilder;
    use crate::testcase::signature::MethodSignature;

    fn class(name: &str, method: &str) -> TestClass {
        TestClassBuilder::<()>::new(name)
            .constructor(|| ())
            .declare(MethodSignature::public(method))
            .build()
    }

    #[test]
    fn test_application_registry_wins() {
        let mut application = TestRegistry::new();
        application.register(class("Foo", "testApplication"));
        let mut context = TestRegistry::new();
        context.register(class("Foo", "testContext"));
        context.register(class("Bar", "testContext"));

        let loader = ClassLoader::new(Arc::new(application)).with_context(Arc::new(context));
        let foo = loader.load("Foo").unwrap();
        assert!(foo.find_method("testApplication").is_some());
        let bar = loader.load("Bar").unwrap();
        assert!(bar.find_method("testContext").is_some());
    }

    #[test]
    fn test_unknown_class() {
        let loader = ClassLoader::new(Arc::new(TestRegistry::new()));
        assert!(matches!(
            loader.load("Missing"),
            Err(CactusError::ClassNotFound(name)) if name == "Missing"
        ));
    }
}
