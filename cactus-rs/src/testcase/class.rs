//! Test classes as registered method tables.
//!
//! A [`TestClass`] plays the part of a runtime class description: it knows
//! how to construct an instance, which methods it declares (with their
//! signatures, so they can be validated before use) and which class it
//! extends. Instances are type-erased; every registered method downcasts the
//! instance back to the concrete type it was registered for.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;

use super::signature::{ImplementDefect, MethodSignature, TestCaseImplementError, TypeRef, Visibility};
use crate::client::{RawResponse, WebResponse};
use crate::error::{CactusError, Result};
use crate::request::WebRequest;
use crate::server::ServerContext;
use crate::utils::panic_message;

/// A type-erased test class instance.
pub type TestObject = dyn Any + Send;

pub type BeginFn<T> = for<'a> fn(&'a mut T, &'a mut WebRequest) -> BoxFuture<'a, ()>;
pub type TestFn<T> = for<'a> fn(&'a mut T, &'a mut ServerContext) -> BoxFuture<'a, ()>;
pub type EndFn<T, R> = for<'a> fn(&'a mut T, &'a R) -> BoxFuture<'a, ()>;

/// The argument a method is called with, which also says in which role it
/// is called.
pub enum Invocation<'a> {
    Begin(&'a mut WebRequest),
    Test(&'a mut ServerContext),
    End(EndResponse<'a>),
}

impl Invocation<'_> {
    fn argument_type(&self) -> TypeRef {
        match self {
            Invocation::Begin(_) => TypeRef::WEB_REQUEST,
            Invocation::Test(_) => TypeRef::VOID,
            Invocation::End(response) => response.type_ref(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum EndResponse<'a> {
    Web(&'a WebResponse),
    Raw(&'a RawResponse),
}

impl EndResponse<'_> {
    pub fn type_ref(&self) -> TypeRef {
        match self {
            EndResponse::Web(_) => TypeRef::WEB_RESPONSE,
            EndResponse::Raw(_) => TypeRef::RAW_RESPONSE,
        }
    }
}

/// Response representations an end hook can ask for.
pub trait ResponseFamily: Sync + 'static {
    const TYPE: TypeRef;

    fn select<'a>(response: EndResponse<'a>) -> Option<&'a Self>;
}

impl ResponseFamily for WebResponse {
    const TYPE: TypeRef = TypeRef::WEB_RESPONSE;

    fn select<'a>(response: EndResponse<'a>) -> Option<&'a Self> {
        match response {
            EndResponse::Web(response) => Some(response),
            EndResponse::Raw(_) => None,
        }
    }
}

impl ResponseFamily for RawResponse {
    const TYPE: TypeRef = TypeRef::RAW_RESPONSE;

    fn select<'a>(response: EndResponse<'a>) -> Option<&'a Self> {
        match response {
            EndResponse::Raw(response) => Some(response),
            EndResponse::Web(_) => None,
        }
    }
}

/// Calls a method body. Returns `None` when the instance or the invocation
/// does not fit the method.
pub type Invoker = Arc<
    dyn for<'a> Fn(&'a mut TestObject, Invocation<'a>) -> Option<BoxFuture<'a, ()>> + Send + Sync,
>;

pub fn invoker<F>(f: F) -> Invoker
where
    F: for<'a> Fn(&'a mut TestObject, Invocation<'a>) -> Option<BoxFuture<'a, ()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

type Projection = Arc<dyn for<'a> Fn(&'a mut TestObject) -> Option<&'a mut TestObject> + Send + Sync>;

fn projection<F>(f: F) -> Projection
where
    F: for<'a> Fn(&'a mut TestObject) -> Option<&'a mut TestObject> + Send + Sync + 'static,
{
    Arc::new(f)
}

type NameSetter = Arc<dyn Fn(&mut TestObject, &str) + Send + Sync>;

#[derive(Clone)]
enum ConstructorBody {
    WithName(Arc<dyn Fn(&str) -> Box<TestObject> + Send + Sync>),
    NoArg(Arc<dyn Fn() -> Box<TestObject> + Send + Sync>),
}

#[derive(Clone)]
struct Constructor {
    visibility: Visibility,
    body: ConstructorBody,
}

#[derive(Clone)]
pub struct TestMethod {
    signature: MethodSignature,
    invoker: Invoker,
}

impl TestMethod {
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// A constructed test object.
pub struct TestInstance {
    class_name: String,
    object: Box<TestObject>,
}

impl TestInstance {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object(&self) -> &TestObject {
        &*self.object
    }

    pub fn object_mut(&mut self) -> &mut TestObject {
        &mut *self.object
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInstance")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

/// A method found on a class or one of its superclasses.
#[derive(Clone)]
pub struct ResolvedMethod {
    class_name: String,
    method: TestMethod,
    projections: Vec<Projection>,
}

impl ResolvedMethod {
    pub fn signature(&self) -> &MethodSignature {
        &self.method.signature
    }

    /// Name of the class the method was looked up on.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn invoke<'a>(
        &self,
        instance: &'a mut TestInstance,
        invocation: Invocation<'a>,
    ) -> std::result::Result<BoxFuture<'a, ()>, TestCaseImplementError> {
        let argument = invocation.argument_type();
        let mismatch = || {
            TestCaseImplementError::new(
                &self.class_name,
                &self.method.signature.name,
                ImplementDefect::ParameterType {
                    position: 1,
                    expected: self
                        .method
                        .signature
                        .parameters
                        .first()
                        .copied()
                        .unwrap_or(TypeRef::VOID),
                    actual: argument,
                },
            )
        };

        let mut target = instance.object_mut();
        for project in &self.projections {
            target = project(target).ok_or_else(mismatch)?;
        }
        (self.method.invoker)(target, invocation).ok_or_else(mismatch)
    }
}

pub struct TestClass {
    name: String,
    visibility: Visibility,
    implements_test: bool,
    superclass: Option<(Arc<TestClass>, Projection)>,
    constructors: Vec<Constructor>,
    name_setter: Option<NameSetter>,
    methods: Vec<TestMethod>,
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("implements_test", &self.implements_test)
            .field(
                "superclass",
                &self.superclass.as_ref().map(|(parent, _)| parent.name()),
            )
            .field(
                "methods",
                &self
                    .methods
                    .iter()
                    .map(|method| method.signature.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TestClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn implements_test(&self) -> bool {
        self.implements_test
    }

    pub fn superclass(&self) -> Option<&Arc<TestClass>> {
        self.superclass.as_ref().map(|(parent, _)| parent)
    }

    /// Whether a public constructor taking a name or nothing exists.
    pub fn has_public_constructor(&self) -> bool {
        self.constructors
            .iter()
            .any(|constructor| constructor.visibility == Visibility::Public)
    }

    /// Methods declared by this class itself, in registration order.
    pub fn declared_methods(&self) -> impl Iterator<Item = &TestMethod> {
        self.methods.iter()
    }

    /// Creates an instance for running `test_name`, preferring a public
    /// constructor taking the name over a public no-argument one. Named
    /// instances get their name set afterwards in either case.
    pub fn instantiate(&self, test_name: &str) -> Result<TestInstance> {
        if !self.is_public() {
            return Err(self.instantiation_error("class is not public"));
        }

        let public = || {
            self.constructors
                .iter()
                .filter(|constructor| constructor.visibility == Visibility::Public)
        };
        let body = public()
            .find(|constructor| matches!(constructor.body, ConstructorBody::WithName(_)))
            .or_else(|| public().next())
            .map(|constructor| constructor.body.clone())
            .ok_or_else(|| {
                self.instantiation_error("no public constructor taking a name or no argument")
            })?;

        let object = panic::catch_unwind(AssertUnwindSafe(|| match &body {
            ConstructorBody::WithName(construct) => construct(test_name),
            ConstructorBody::NoArg(construct) => construct(),
        }))
        .map_err(|payload| self.instantiation_error(&panic_message(payload.as_ref())))?;

        let mut instance = TestInstance {
            class_name: self.name.clone(),
            object,
        };
        self.set_name(instance.object_mut(), test_name);
        Ok(instance)
    }

    fn set_name(&self, object: &mut TestObject, name: &str) {
        if let Some(setter) = &self.name_setter {
            setter(object, name);
        } else if let Some((parent, project)) = &self.superclass {
            if let Some(inner) = project(object) {
                parent.set_name(inner, name);
            }
        }
    }

    fn instantiation_error(&self, reason: &str) -> CactusError {
        CactusError::Instantiation {
            class: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Looks a method up by name on this class, then on its superclasses.
    pub fn find_method(&self, name: &str) -> Option<ResolvedMethod> {
        if let Some(method) = self.methods.iter().find(|method| method.signature.name == name) {
            return Some(ResolvedMethod {
                class_name: self.name.clone(),
                method: method.clone(),
                projections: Vec::new(),
            });
        }

        let (parent, project) = self.superclass.as_ref()?;
        let inherited = parent.find_method(name)?;
        let mut projections = Vec::with_capacity(inherited.projections.len() + 1);
        projections.push(project.clone());
        projections.extend(inherited.projections);
        Some(ResolvedMethod {
            class_name: self.name.clone(),
            method: inherited.method,
            projections,
        })
    }

    /// Methods shaped like test methods (named `test...`, returning nothing,
    /// taking no parameters) on this class and on every superclass that is
    /// still a test. An overriding method hides the inherited one.
    ///
    /// Non-public methods are included; callers decide what to do with them.
    pub fn test_methods(&self) -> Vec<MethodSignature> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut class = Some(self);
        while let Some(current) = class {
            if !current.implements_test {
                break;
            }
            for method in &current.methods {
                let signature = &method.signature;
                if is_test_method(signature) && seen.insert(signature.name.clone()) {
                    found.push(signature.clone());
                }
            }
            class = current.superclass().map(Arc::as_ref);
        }
        found
    }
}

fn is_test_method(signature: &MethodSignature) -> bool {
    signature.name.starts_with("test")
        && signature.returns_void()
        && signature.parameters.is_empty()
}

/// Describes a test class for type `T`.
///
/// ```ignore
/// let class = TestClassBuilder::<SessionTest>::new("SessionTest")
///     .constructor(SessionTest::default)
///     .begin("beginSetAttribute", SessionTest::begin_set_attribute)
///     .test("testSetAttribute", SessionTest::test_set_attribute)
///     .end("endSetAttribute", SessionTest::end_set_attribute)
///     .build();
/// ```
pub struct TestClassBuilder<T> {
    class: TestClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> TestClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: TestClass {
                name: name.into(),
                visibility: Visibility::Public,
                implements_test: true,
                superclass: None,
                constructors: Vec::new(),
                name_setter: None,
                methods: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.class.visibility = visibility;
        self
    }

    /// Classes that are not tests end the search for inherited test
    /// methods.
    pub fn implements_test(mut self, implements_test: bool) -> Self {
        self.class.implements_test = implements_test;
        self
    }

    pub fn constructor_with_name(self, construct: fn(&str) -> T) -> Self {
        self.add_constructor(
            Visibility::Public,
            ConstructorBody::WithName(Arc::new(move |name: &str| {
                Box::new(construct(name)) as Box<TestObject>
            })),
        )
    }

    pub fn constructor(self, construct: fn() -> T) -> Self {
        self.declared_constructor(Visibility::Public, construct)
    }

    pub fn declared_constructor(self, visibility: Visibility, construct: fn() -> T) -> Self {
        self.add_constructor(
            visibility,
            ConstructorBody::NoArg(Arc::new(move || Box::new(construct()) as Box<TestObject>)),
        )
    }

    fn add_constructor(mut self, visibility: Visibility, body: ConstructorBody) -> Self {
        self.class.constructors.push(Constructor { visibility, body });
        self
    }

    /// Marks instances as named: the name of the test method they are
    /// created for is set through `set_name`.
    pub fn set_name_with(mut self, set_name: fn(&mut T, &str)) -> Self {
        self.class.name_setter = Some(Arc::new(move |object: &mut TestObject, name: &str| {
            if let Some(instance) = object.downcast_mut::<T>() {
                set_name(instance, name);
            }
        }));
        self
    }

    pub fn extends<P: Any + Send>(
        mut self,
        parent: Arc<TestClass>,
        project: fn(&mut T) -> &mut P,
    ) -> Self {
        let project = projection(move |object| {
            object
                .downcast_mut::<T>()
                .map(|instance| project(instance) as &mut TestObject)
        });
        self.class.superclass = Some((parent, project));
        self
    }

    pub fn begin(self, name: &str, begin: BeginFn<T>) -> Self {
        self.method(
            MethodSignature::public(name).with_parameter(TypeRef::WEB_REQUEST),
            invoker(move |object, invocation| match invocation {
                Invocation::Begin(request) => Some(begin(object.downcast_mut::<T>()?, request)),
                _ => None,
            }),
        )
    }

    pub fn test(self, name: &str, test: TestFn<T>) -> Self {
        self.method(
            MethodSignature::public(name),
            invoker(move |object, invocation| match invocation {
                Invocation::Test(context) => Some(test(object.downcast_mut::<T>()?, context)),
                _ => None,
            }),
        )
    }

    /// Registers an end hook; the response family is the one `end` takes.
    pub fn end<R: ResponseFamily>(self, name: &str, end: EndFn<T, R>) -> Self {
        self.method(
            MethodSignature::public(name).with_parameter(R::TYPE),
            invoker(move |object, invocation| match invocation {
                Invocation::End(response) => {
                    let response = R::select(response)?;
                    Some(end(object.downcast_mut::<T>()?, response))
                }
                _ => None,
            }),
        )
    }

    /// Declares a method with an empty body.
    pub fn declare(self, signature: MethodSignature) -> Self {
        self.method(
            signature,
            invoker(|_, _| Some(Box::pin(futures::future::ready(())))),
        )
    }

    /// Declares a method with an explicit signature and body. A later
    /// declaration with the same name replaces the earlier one.
    pub fn method(mut self, signature: MethodSignature, invoker: Invoker) -> Self {
        self.class
            .methods
            .retain(|method| method.signature.name != signature.name);
        self.class.methods.push(TestMethod { signature, invoker });
        self
    }

    pub fn build(self) -> TestClass {
        self.class
    }
}
