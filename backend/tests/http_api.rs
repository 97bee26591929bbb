use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rowpipe::config::AppConfig;
use rowpipe::job_controller::registry::JobRegistry;
use rowpipe::job_controller::runner::{JobRunner, RunnerConfig};
use rowpipe::services::{students, AppState};
use rowpipe::storage::FileStorage;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Handle;

const BOUNDARY: &str = "rowpipe-test-boundary";

fn app_state(dir: &TempDir, workers: usize, queue_capacity: usize) -> AppState {
    let config = AppConfig {
        storage_dir: dir.path().join("files"),
        database_path: dir.path().join("students.sqlite"),
        workers,
        queue_capacity,
        ..AppConfig::default()
    };
    let storage = FileStorage::new(&config.storage_dir);
    storage.init().unwrap();
    let registry = JobRegistry::new();
    let runner = JobRunner::new(
        registry.clone(),
        RunnerConfig {
            workers,
            queue_capacity,
        },
        Handle::current(),
    );
    AppState {
        registry,
        runner,
        storage,
        config,
    }
}

fn multipart(filename: &str, content: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn json_of(resp: ServiceResponse) -> Value {
    test::read_body_json(resp).await
}

async fn wait_until_finished<S>(app: &S, job_id: &str) -> Value
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    for _ in 0..500 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/students/status/{job_id}"))
            .to_request();
        let resp = test::call_service(app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let job = json_of(resp).await["data"].clone();
        if job["status"] == "COMPLETED" || job["status"] == "FAILED" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not finish");
}

async fn upload<S>(app: &S, route: &str, file: &Path, filename: &str) -> ServiceResponse
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let (content_type, body) = multipart(filename, &std::fs::read(file).unwrap());
    let req = test::TestRequest::post()
        .uri(route)
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    test::call_service(app, req).await
}

#[actix_web::test]
async fn full_pipeline_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&dir, 2, 8)))
            .service(students::configure_routes()),
    )
    .await;

    // Generate
    let req = test::TestRequest::post()
        .uri("/api/students/generate?count=30")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["success"], true);
    let job_id = body["data"]["jobId"].as_str().unwrap().to_string();
    let job = wait_until_finished(&app, &job_id).await;
    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["progress"], 100);
    let workbook = job["result"].as_str().unwrap().to_string();
    assert!(workbook.ends_with(&format!("StudentData_{job_id}.xlsx")));

    // Transform
    let resp = upload(&app, "/api/students/process", Path::new(&workbook), "students.xlsx").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let job_id = json_of(resp).await["data"]["jobId"].as_str().unwrap().to_string();
    let job = wait_until_finished(&app, &job_id).await;
    assert_eq!(job["status"], "COMPLETED");
    let csv = job["result"].as_str().unwrap().to_string();
    let text = std::fs::read_to_string(&csv).unwrap();
    assert!(text.starts_with("id,firstName,lastName,dateOfBirth,class,score\n"));
    assert_eq!(text.lines().count(), 31);

    // Load
    let resp = upload(&app, "/api/students/upload", Path::new(&csv), "students.csv").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let job_id = json_of(resp).await["data"]["jobId"].as_str().unwrap().to_string();
    let job = wait_until_finished(&app, &job_id).await;
    assert_eq!(job["status"], "COMPLETED");
    assert_eq!(job["result"], "30 rows inserted");

    // Queries
    let req = test::TestRequest::get().uri("/api/students/count").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["total"], 30);

    let req = test::TestRequest::get()
        .uri("/api/students/report?page=0&size=10&sortBy=score&sortDir=desc")
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    let page = &body["data"];
    assert_eq!(page["totalElements"], 30);
    assert_eq!(page["totalPages"], 3);
    let scores: Vec<f64> = page["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|student| student["score"].as_f64().unwrap())
        .collect();
    assert_eq!(scores.len(), 10);
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    assert!(scores.iter().all(|score| (70.0..=90.0).contains(score)));

    let req = test::TestRequest::get()
        .uri("/api/students/report/export/csv")
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["fileName"], "students_report.csv");
    let exported = STANDARD.decode(body["data"]["data"].as_str().unwrap()).unwrap();
    let exported = String::from_utf8(exported).unwrap();
    assert_eq!(exported.lines().count(), 31);

    let req = test::TestRequest::get()
        .uri("/api/students/report/export/excel?studentClass=Class1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    let workbook = STANDARD.decode(body["data"]["data"].as_str().unwrap()).unwrap();
    assert!(workbook.starts_with(b"PK"));
}

#[actix_web::test]
async fn bad_requests_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state(&dir, 1, 1)))
            .service(students::configure_routes()),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/students/generate?count=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_of(resp).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::get()
        .uri("/api/students/status/no-such-job")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "hello").unwrap();
    let resp = upload(&app, "/api/students/upload", &notes, "notes.txt").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/students/report?sortBy=password")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn full_queue_answers_503_and_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(&dir, 1, 0);
    let registry = state.registry.clone();

    // Occupy the only slot until the test lets go.
    let (release, gate) = std::sync::mpsc::channel::<()>();
    let busy = registry.create_job();
    let handle = state
        .runner
        .submit(busy, move |_| {
            let _ = gate.recv();
            Ok(None)
        })
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(students::configure_routes()),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/students/generate?count=5")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_of(resp).await;
    assert_eq!(body["message"], "job queue is full, try again later");
    assert_eq!(registry.job_count(), 2);

    release.send(()).unwrap();
    handle.wait().await;
}
