// Import Rocket macros and external crates.
#[macro_use] extern crate rocket;

mod config;
mod error;
mod executor;
mod grader;
mod language;

use config::Config;
use error::Error;
use executor::{ExecutionResult, Executor, Invocation};
use grader::GradeReport;
use language::Language;
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::Deserialize;

//
// Routes for Running Code
//

/// Body of `POST /run`.
#[derive(Deserialize, Debug)]
struct RunRequest {
    code: String,
    language: String,
    #[serde(default)]
    input: String,
}

/// POST /run
/// Compiles (if needed) and runs the submitted code once against `input`.
/// Compile errors and timeouts come back as 200 with the message in `error`.
#[post("/run", data = "<request>")]
async fn run(
    request: Json<RunRequest>,
    executor: &State<Executor>,
) -> Result<Json<ExecutionResult>, Error> {
    let request = request.into_inner();
    let invocation = Invocation::new(request.code, &request.language, request.input)?;
    let result = executor.execute(&invocation).await?;
    Ok(Json(result))
}

/// GET /languages
/// Lists the accepted language tags.
#[get("/languages")]
fn languages() -> Json<serde_json::Value> {
    let tags: Vec<&str> = Language::ALL.iter().map(|l| l.tag()).collect();
    Json(serde_json::json!({ "languages": tags }))
}

//
// Routes for Grading Against Test Cases
//

/// Body of `POST /judge`.
#[derive(Deserialize, Debug)]
struct JudgeRequest {
    code: String,
    language: String,
    question: String,
}

/// POST /judge
/// Builds the submission once and runs it against every stored test case of `question`.
#[post("/judge", data = "<request>")]
async fn judge(
    request: Json<JudgeRequest>,
    executor: &State<Executor>,
) -> Result<Json<GradeReport>, Error> {
    let request = request.into_inner();
    let invocation = Invocation::new(request.code, &request.language, "")?;

    let mut store = grader::load_test_cases(&executor.config().test_cases).await?;
    let cases = store
        .remove(&request.question)
        .ok_or_else(|| Error::UnknownQuestion(request.question.clone()))?;

    let report = grader::grade(executor, &invocation, &request.question, &cases).await?;
    Ok(Json(report))
}

//
// Launch the Application
//

/// Reads the `runner` configuration, prepares the work root and manages the executor.
fn build(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(AdHoc::try_on_ignite("Code executor", |rocket| async move {
            let config: Config = match rocket.figment().focus("runner").extract() {
                Ok(config) => config,
                Err(e) => {
                    log::error!("invalid runner configuration: {}", e);
                    return Err(rocket);
                }
            };
            if let Err(e) = config.validate() {
                log::error!("invalid runner configuration: {}", e);
                return Err(rocket);
            }
            if let Err(e) = tokio::fs::create_dir_all(&config.work_root).await {
                log::error!(
                    "cannot create work root {}: {}",
                    config.work_root.display(),
                    e
                );
                return Err(rocket);
            }
            log::info!(
                "executing submissions under {} (run limit {:?}, compile limit {:?})",
                config.work_root.display(),
                config.run_limit(),
                config.compile_limit()
            );
            Ok(rocket.manage(Executor::new(config)))
        }))
        .mount("/", routes![run, languages, judge])
}

#[launch]
fn rocket() -> _ {
    build(rocket::Config::figment())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};
    use std::path::Path;

    fn figment(root: &Path) -> Figment {
        rocket::Config::figment()
            .merge(("runner.work_root", root))
            .merge(("runner.toolchain.python", "sh"))
            .merge(("runner.toolchain.cc", "sh"))
    }

    async fn client(figment: Figment) -> Client {
        Client::tracked(build(figment)).await.unwrap()
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[rocket::async_test]
    async fn run_returns_output_and_error() {
        let root = tempfile::tempdir().unwrap();
        let client = client(figment(root.path())).await;

        let response = client
            .post("/run")
            .json(&json!({"code": "read l; echo \"$l\"", "language": "python", "input": "5"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({"output": "5\n", "error": ""}));
        assert!(is_empty_dir(root.path()));
    }

    #[rocket::async_test]
    async fn run_reports_compile_errors_as_ok() {
        let root = tempfile::tempdir().unwrap();
        let client = client(figment(root.path())).await;

        let response = client
            .post("/run")
            .json(&json!({"code": "echo 'expected ;' >&2; exit 1", "language": "c", "input": ""}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({"output": "", "error": "expected ;\n"}));
    }

    #[rocket::async_test]
    async fn run_rejects_unknown_language() {
        let root = tempfile::tempdir().unwrap();
        let client = client(figment(root.path())).await;

        let response = client
            .post("/run")
            .json(&json!({"code": "fn main() {}", "language": "rust", "input": ""}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["output"], "");
        assert_eq!(body["error"], "unsupported language `rust`");
        assert!(is_empty_dir(root.path()));
    }

    #[rocket::async_test]
    async fn run_surfaces_missing_toolchain() {
        let root = tempfile::tempdir().unwrap();
        let figment = figment(root.path()).merge(("runner.toolchain.cxx", "no-such-cxx"));
        let client = client(figment).await;

        let response = client
            .post("/run")
            .json(&json!({"code": "int main() {}", "language": "cpp", "input": ""}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::InternalServerError);
        let body: Value = response.into_json().await.unwrap();
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("failed to start `no-such-cxx`"));
        assert!(is_empty_dir(root.path()));
    }

    #[rocket::async_test]
    async fn lists_languages() {
        let root = tempfile::tempdir().unwrap();
        let client = client(figment(root.path())).await;

        let response = client.get("/languages").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({"languages": ["python", "c", "cpp", "java"]}));
    }

    #[rocket::async_test]
    async fn judge_grades_stored_cases() {
        let root = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let cases = store.path().join("cases.json");
        std::fs::write(
            &cases,
            json!({
                "sum": [
                    {"description": "small", "input": "3 5", "expected_output": "8"},
                    {"description": "large", "input": "28282929 2828282", "expected_output": "31111211"}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let client = client(figment(root.path()).merge(("runner.test_cases", &cases))).await;

        let response = client
            .post("/judge")
            .json(&json!({"code": "read a b; echo $((a + b))", "language": "python", "question": "sum"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["passed"], 2);
        assert_eq!(body["total"], 2);
        assert_eq!(body["compile_error"], Value::Null);
        assert_eq!(body["results"][0]["description"], "small");

        let response = client
            .post("/judge")
            .json(&json!({"code": "true", "language": "python", "question": "nope"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn judge_without_store_is_a_server_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("absent.json");
        let client = client(figment(root.path()).merge(("runner.test_cases", &missing))).await;

        let response = client
            .post("/judge")
            .json(&json!({"code": "true", "language": "python", "question": "sum"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::InternalServerError);
    }

    #[rocket::async_test]
    async fn invalid_config_aborts_ignition() {
        let root = tempfile::tempdir().unwrap();
        let figment = figment(root.path()).merge(("runner.run_timeout", 0));

        match Client::tracked(build(figment)).await {
            Ok(_) => panic!("ignition should have failed"),
            Err(e) => assert!(matches!(
                e.kind(),
                rocket::error::ErrorKind::FailedFairings(_)
            )),
        }
    }
}
