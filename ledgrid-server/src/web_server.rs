use anyhow::{Context, Result};
use axum::extract::{self, Form, Path, Query, Request};
use axum::http::{header, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use derive_more::{Display, From};
use ledgrid_matrix_lib::{Color, ColorName, LedMatrix, Program, UnknownColorName, UnknownMatrix, UnknownProgram};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::self_test;
use crate::State;

type Shared = extract::State<Arc<State>>;

/// One entry of `/status/`
#[derive(Debug, Serialize)]
struct MatrixStatus {
    name: String,
    rows: usize,
    cols: usize,
    strip: Option<String>,
    state: String,
    running_task: String,
}

impl MatrixStatus {
    fn of(matrix: &LedMatrix) -> Self {
        Self {
            name: matrix.name().to_string(),
            rows: matrix.rows(),
            cols: matrix.cols(),
            strip: matrix.strip().map(|strip| strip.identifier()),
            state: matrix.state().to_string(),
            running_task: matrix.running_task(),
        }
    }
}

#[derive(Serialize)]
struct TestStarted {
    started: &'static str,
}

/// Parameters of a program change, from the query string or a form body.
/// Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
struct ProgramParams {
    program: Option<String>,
    color1: Option<String>,
    color2: Option<String>,
}

impl ProgramParams {
    /// Fill the fields missing here from `other`.
    fn or(self, other: Self) -> Self {
        let pick = |mine: Option<String>, theirs: Option<String>| {
            mine.filter(|value| !value.is_empty())
                .or_else(|| theirs.filter(|value| !value.is_empty()))
        };
        Self {
            program: pick(self.program, other.program),
            color1: pick(self.color1, other.color1),
            color2: pick(self.color2, other.color2),
        }
    }

    fn program(&self) -> Result<Program, UnknownProgram> {
        self.program.as_deref().map_or(Ok(Program::default()), str::parse)
    }

    fn colors(&self) -> Result<[Color; 2], UnknownColorName> {
        let color = |value: Option<&str>| {
            value
                .map_or(Ok(ColorName::default()), str::parse::<ColorName>)
                .map(ColorName::color)
        };
        Ok([color(self.color1.as_deref())?, color(self.color2.as_deref())?])
    }
}

/// Failures a control request can answer with
#[derive(Debug, Display, From)]
enum ControlError {
    UnknownMatrix(UnknownMatrix),
    UnknownProgram(UnknownProgram),
    UnknownColorName(UnknownColorName),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::UnknownMatrix(_) => StatusCode::NOT_FOUND,
            Self::UnknownProgram(_) | Self::UnknownColorName(_) => StatusCode::BAD_REQUEST,
        };
        info!("HTTP: {self}");
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/status/", get(status))
        .route("/block/", get(block_list_page))
        .route("/block/:name/", get(block_page).post(set_program))
        .route("/block/:name/colors/", get(block_colors))
        .route("/test/", get(start_self_test))
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<State>) -> Result<()> {
    axum::serve(listener, router(state))
        .await
        .context("HTTP server stopped")
}

async fn log_request(request: Request, next: Next) -> Response {
    info!("HTTP: {} {}", request.method(), request.uri().path());
    next.run(request).await
}

async fn not_found(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Nothing at {}", uri.path()))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body><h1>{title}</h1>\n{body}</body></html>\n",
        title = escape_html(title)
    ))
}

fn block_link(matrix: &LedMatrix) -> String {
    let name = escape_html(matrix.name());
    format!("<a href=\"/block/{name}/\">{name}</a>")
}

async fn index_page(extract::State(state): Shared) -> Html<String> {
    let mut body = String::from("<ul>\n");
    for matrix in state.registry.iter() {
        let _ = writeln!(
            body,
            "<li>{} ({}x{}): {}</li>",
            block_link(matrix),
            matrix.rows(),
            matrix.cols(),
            escape_html(&matrix.running_task())
        );
    }
    body.push_str("</ul>\n<p><a href=\"/status/\">status</a> | <a href=\"/test/\">strip self-test</a></p>\n");
    page("LED matrices", &body)
}

async fn status(extract::State(state): Shared) -> Json<Vec<MatrixStatus>> {
    Json(state.registry.iter().map(|matrix| MatrixStatus::of(matrix)).collect())
}

async fn block_list_page(extract::State(state): Shared) -> Html<String> {
    let mut body = String::from("<ul>\n");
    for matrix in state.registry.iter() {
        let _ = writeln!(body, "<li>{}</li>", block_link(matrix));
    }
    body.push_str("</ul>\n");
    page("Blocks", &body)
}

fn options<'a>(values: impl IntoIterator<Item = &'a str>, selected: &str) -> String {
    let mut out = String::new();
    for value in values {
        let marker = if value == selected { " selected" } else { "" };
        let _ = write!(out, "<option value=\"{value}\"{marker}>{value}</option>");
    }
    out
}

async fn block_page(extract::State(state): Shared, Path(name): Path<String>) -> Result<Html<String>, ControlError> {
    let matrix = state.registry.get(&name)?;

    let mut body = String::new();
    let _ = writeln!(body, "<p>{}</p>", escape_html(&matrix.running_task()));
    body.push_str("<table>\n");
    for row in matrix.html_colors() {
        body.push_str("<tr>");
        for (background, text) in row {
            let _ = write!(
                body,
                "<td style=\"background:{background};color:{text};width:3em;height:3em\">{background}</td>"
            );
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>\n");

    let color_names = || ColorName::ALL.into_iter().map(ColorName::as_str);
    let _ = write!(
        body,
        "<form method=\"post\" action=\"/block/{action}/\">\n\
         <select name=\"program\">{programs}</select>\n\
         <select name=\"color1\">{colors}</select>\n\
         <select name=\"color2\">{colors}</select>\n\
         <button type=\"submit\">Run</button>\n</form>\n",
        action = escape_html(matrix.name()),
        programs = options(Program::ALL.into_iter().map(Program::as_str), Program::default().as_str()),
        colors = options(color_names(), ColorName::default().as_str()),
    );
    Ok(page(&format!("Matrix {}", matrix.name()), &body))
}

/// Start a program in the background and send the browser back to the
/// matrix page. The request takes its place in line before the handler
/// returns, so of several requests for one matrix the last one received is
/// the one left running.
async fn set_program(
    extract::State(state): Shared,
    Path(name): Path<String>,
    Query(query): Query<ProgramParams>,
    form: Option<Form<ProgramParams>>,
) -> Result<Response, ControlError> {
    let matrix = Arc::clone(state.registry.get(&name)?);

    let params = query.or(form.map(|Form(form)| form).unwrap_or_default());
    let program = params.program()?;
    let colors = params.colors()?;

    info!("HTTP: matrix '{}' -> {program} {colors:?}", matrix.name());
    let location = format!("/block/{}/", matrix.name());
    let ticket = matrix.program_ticket();
    tokio::spawn(async move { matrix.run_program_in_order(ticket, program, &colors).await });
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn block_colors(
    extract::State(state): Shared,
    Path(name): Path<String>,
) -> Result<Json<Vec<Vec<(String, String)>>>, ControlError> {
    Ok(Json(state.registry.get(&name)?.html_colors()))
}

async fn start_self_test(extract::State(state): Shared) -> Json<TestStarted> {
    let started = self_test::start_all(state.strips.values());
    info!("HTTP: started self-test on {started} strips");
    Json(TestStarted { started: "successful" })
}
