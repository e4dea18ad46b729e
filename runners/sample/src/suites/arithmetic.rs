use cactus::testcase::MethodSignature;
use cactus::{dyn_async, ServerContext, TestClass, TestClassBuilder};

/// A plain test class without hooks, run through the server-side wrapper.
#[derive(Default)]
pub struct Arithmetic;

pub fn class() -> TestClass {
    TestClassBuilder::<Arithmetic>::new("Arithmetic")
        .constructor(Arithmetic::default)
        .test("testAddition", test_addition)
        .test("testOverflow", test_overflow)
        .declare(MethodSignature::public("helper"))
        .build()
}

dyn_async! {
    async fn test_addition<'a>(_test: &'a mut Arithmetic, _context: &'a mut ServerContext) {
        assert_eq!(1 + 1, 2);
    }
}

dyn_async! {
    async fn test_overflow<'a>(_test: &'a mut Arithmetic, _context: &'a mut ServerContext) {
        assert_eq!(u8::MAX.checked_add(1), None);
    }
}
