use cactus::dyn_async;
use cactus::server::SESSION_COOKIE_NAME;
use cactus::simulated_url::SimulatedUrl;
use cactus::{RawResponse, ServerContext, TestClass, TestClassBuilder, WebRequest, WebResponse};

/// Exercises the implicit objects a test method gets inside the container.
#[derive(Default)]
pub struct SessionTest {
    name: String,
}

pub fn class() -> TestClass {
    TestClassBuilder::<SessionTest>::new("SessionTest")
        .constructor(SessionTest::default)
        .set_name_with(|test, name| test.name = name.to_string())
        .begin("beginSetAttribute", begin_set_attribute)
        .test("testSetAttribute", test_set_attribute)
        .end("endSetAttribute", end_set_attribute)
        .begin("beginSimulatedUrl", begin_simulated_url)
        .test("testSimulatedUrl", test_simulated_url)
        .test("testStatus", test_status)
        .end("endStatus", end_status)
        .build()
}

dyn_async! {
    async fn begin_set_attribute<'a>(_test: &'a mut SessionTest, request: &'a mut WebRequest) {
        request.add_parameter("user", "tester");
    }
}

dyn_async! {
    async fn test_set_attribute<'a>(test: &'a mut SessionTest, context: &'a mut ServerContext) {
        let user = context.request.parameter("user").unwrap_or_default().to_string();
        let session = context.session().expect("automatic session");
        session.set_attribute("user", user.as_str());
        assert_eq!(session.attribute("user").as_deref(), Some("tester"));

        context.response.set_content_type("text/plain");
        context.response.write(&format!("{}: hello {user}", test.name));
    }
}

dyn_async! {
    async fn end_set_attribute<'a>(_test: &'a mut SessionTest, response: &'a WebResponse) {
        assert_eq!(response.text(), "testSetAttribute: hello tester");
        assert!(
            response.cookie(SESSION_COOKIE_NAME).is_some(),
            "no {SESSION_COOKIE_NAME} cookie"
        );
    }
}

dyn_async! {
    async fn begin_simulated_url<'a>(_test: &'a mut SessionTest, request: &'a mut WebRequest) {
        request.set_url(
            SimulatedUrl::new("jakarta.apache.org:80")
                .with_context_path("/mywebapp")
                .with_servlet_path("/test")
                .with_query_string("param=value"),
        );
    }
}

dyn_async! {
    async fn test_simulated_url<'a>(_test: &'a mut SessionTest, context: &'a mut ServerContext) {
        let request = &context.request;
        assert_eq!(request.server_name(), Some("jakarta.apache.org"));
        assert_eq!(request.context_path(), Some("/mywebapp"));
        assert_eq!(request.request_uri(), "/mywebapp/test");
        assert_eq!(request.query_string().as_deref(), Some("param=value"));
    }
}

dyn_async! {
    async fn test_status<'a>(_test: &'a mut SessionTest, context: &'a mut ServerContext) {
        context.response.set_status(201);
        context.response.add_header("X-Sample", "raw");
    }
}

dyn_async! {
    async fn end_status<'a>(_test: &'a mut SessionTest, response: &'a RawResponse) {
        assert_eq!(response.status(), 201);
        assert_eq!(response.header("X-Sample"), Some("raw"));
    }
}
