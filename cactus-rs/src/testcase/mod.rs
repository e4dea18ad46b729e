//! Test classes: how they are described, looked up, validated and wrapped.

mod class;
mod registry;
mod signature;
mod suite;

pub use class::{
    invoker, BeginFn, EndFn, EndResponse, Invocation, Invoker, ResolvedMethod, ResponseFamily,
    TestClass, TestClassBuilder, TestFn, TestInstance, TestMethod, TestObject,
};
pub use registry::{ClassLoader, TestRegistry};
pub use signature::{
    validate, DefectCategory, ImplementDefect, MethodRole, MethodSignature,
    TestCaseImplementError, TypeRef, Visibility,
};
pub use suite::{ServerTestSuite, WrappedTest, WRAPPER_CLASS_NAME};
