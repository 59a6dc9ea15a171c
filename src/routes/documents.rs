//! Document API endpoints
//!
//! - `POST   /:id` open raw document bytes (optional `?password=`)
//! - `GET    /:id/pages` page count and natural page sizes
//! - `GET    /:id/pages/widths`, `/:id/pages/heights`
//! - `GET    /:id/pages/:page/image?width=&height=` or `?zoom=`
//! - `GET    /:id/pages/:page/tile?x=&y=&width=&height=&scale=`
//! - `DELETE /:id` close (idempotent)
//!
//! Page numbers in paths are 1-based. Rendered pixels come back as raw RGBA
//! with their dimensions in response headers.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::document::{OpenedDocument, PageRenderRequest, PageSize, TileRequest};
use crate::engine::PdfEngine;
use crate::render::RasterBuffer;
use crate::state::AppState;

/// Zoom used when an image request names neither a size nor a zoom
const DEFAULT_ZOOM: f32 = 1.0;

const IMAGE_WIDTH: HeaderName = HeaderName::from_static("x-image-width");
const IMAGE_HEIGHT: HeaderName = HeaderName::from_static("x-image-height");
const PIXEL_FORMAT: HeaderName = HeaderName::from_static("x-pixel-format");

#[derive(Debug, Deserialize)]
pub struct OpenQuery {
    pub password: Option<String>,
}

/// Either an explicit output size or a zoom factor
#[derive(Debug, Deserialize)]
pub struct PageImageQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub zoom: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct TileQuery {
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSizesResponse {
    pub document_id: String,
    pub page_count: usize,
    pub pages: Vec<PageSize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWidthsResponse {
    pub document_id: String,
    pub widths: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageHeightsResponse {
    pub document_id: String,
    pub heights: Vec<f32>,
}

pub fn router<E: PdfEngine>(max_upload_bytes: usize) -> Router<AppState<E>> {
    Router::new()
        .route("/:id", post(open_document::<E>).delete(close_document::<E>))
        .route("/:id/pages", get(page_sizes::<E>))
        .route("/:id/pages/widths", get(page_widths::<E>))
        .route("/:id/pages/heights", get(page_heights::<E>))
        .route("/:id/pages/:page/image", get(render_page::<E>))
        .route("/:id/pages/:page/tile", get(render_tile::<E>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

async fn open_document<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
    Query(query): Query<OpenQuery>,
    body: Bytes,
) -> ApiResult<Json<OpenedDocument>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is empty".to_string()));
    }

    let opened = state
        .viewer()
        .open_document(id, body.to_vec(), query.password)
        .await?;
    Ok(Json(opened))
}

async fn close_document<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.viewer().close_document(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn page_sizes<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PageSizesResponse>> {
    let pages = state.viewer().get_page_sizes(&id).await?;
    Ok(Json(PageSizesResponse {
        document_id: id,
        page_count: pages.len(),
        pages,
    }))
}

async fn page_widths<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PageWidthsResponse>> {
    let widths = state.viewer().get_pages_width(&id).await?;
    Ok(Json(PageWidthsResponse {
        document_id: id,
        widths,
    }))
}

async fn page_heights<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PageHeightsResponse>> {
    let heights = state.viewer().get_pages_height(&id).await?;
    Ok(Json(PageHeightsResponse {
        document_id: id,
        heights,
    }))
}

async fn render_page<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path((id, page)): Path<(String, usize)>,
    Query(query): Query<PageImageQuery>,
) -> ApiResult<Response> {
    let page_index = page_index(page)?;
    let viewer = state.viewer();

    let buffer = match (query.width, query.height, query.zoom) {
        (Some(width), Some(height), None) => {
            viewer
                .render_page(&id, PageRenderRequest::new(page_index, width, height))
                .await?
        }
        (None, None, zoom) => {
            viewer
                .render_page_at_zoom(&id, page_index, zoom.unwrap_or(DEFAULT_ZOOM))
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "pass either both width and height, or zoom".to_string(),
            ))
        }
    };

    Ok(raster_response(buffer))
}

async fn render_tile<E: PdfEngine>(
    State(state): State<AppState<E>>,
    Path((id, page)): Path<(String, usize)>,
    Query(query): Query<TileQuery>,
) -> ApiResult<Response> {
    let request = TileRequest::new(
        page_index(page)?,
        (query.x, query.y),
        query.width,
        query.height,
        query.scale,
    );
    let buffer = state.viewer().render_tile(&id, request).await?;
    Ok(raster_response(buffer))
}

/// 1-based page number to 0-based index
fn page_index(page: usize) -> ApiResult<usize> {
    page.checked_sub(1)
        .ok_or_else(|| ApiError::BadRequest("page numbers start at 1".to_string()))
}

fn raster_response(buffer: RasterBuffer) -> Response {
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (IMAGE_WIDTH, buffer.width().to_string()),
        (IMAGE_HEIGHT, buffer.height().to_string()),
        (PIXEL_FORMAT, buffer.layout().to_string()),
    ];
    (headers, buffer.into_bytes()).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::engine::fake::{FakeEngine, FakePdf};
    use crate::routes::app;

    fn test_app() -> (AppState<FakeEngine>, Router) {
        let state = AppState::new(Config::default(), FakeEngine::new());
        let router = app(state.clone());
        (state, router)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Vec<u8>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap();
        router.clone().oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn open_letter(router: &Router, id: &str, pages: usize) {
        let bytes = FakePdf::uniform(pages, 612.0, 792.0).to_bytes();
        let response = send(router, Method::POST, &format!("/api/v1/documents/{}", id), bytes).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn header(response: &Response, name: &str) -> String {
        response.headers()[name].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_open_and_page_sizes() {
        let (_, router) = test_app();
        let bytes = FakePdf::uniform(3, 612.0, 792.0).to_bytes();

        let response = send(&router, Method::POST, "/api/v1/documents/doc1", bytes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["documentId"], "doc1");
        assert_eq!(body["pageCount"], 3);

        let response = send(&router, Method::GET, "/api/v1/documents/doc1/pages", vec![]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["pageCount"], 3);
        assert_eq!(body["pages"][2]["width"], 612.0);
        assert_eq!(body["pages"][2]["height"], 792.0);

        let response =
            send(&router, Method::GET, "/api/v1/documents/doc1/pages/widths", vec![]).await;
        let body = json(response).await;
        assert_eq!(body["widths"], serde_json::json!([612.0, 612.0, 612.0]));
    }

    #[tokio::test]
    async fn test_open_with_password() {
        let (_, router) = test_app();
        let bytes = FakePdf::uniform(1, 100.0, 100.0).password("hunter2").to_bytes();

        let response = send(&router, Method::POST, "/api/v1/documents/doc1", bytes.clone()).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = send(
            &router,
            Method::POST,
            "/api/v1/documents/doc1?password=hunter2",
            bytes,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_render_page_image() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 3).await;

        let response = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/image?width=300&height=400",
            vec![],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), "application/octet-stream");
        assert_eq!(header(&response, "x-image-width"), "300");
        assert_eq!(header(&response, "x-image-height"), "400");
        assert_eq!(header(&response, "x-pixel-format"), "rgba8888");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.len(), 300 * 400 * 4);
    }

    #[tokio::test]
    async fn test_render_page_at_zoom() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 1).await;

        let response = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/image?zoom=1",
            vec![],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-image-width"), "1071");
        assert_eq!(header(&response, "x-image-height"), "1386");
    }

    #[tokio::test]
    async fn test_page_numbers_are_one_based() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 3).await;

        let zero = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/0/image?width=10&height=10",
            vec![],
        )
        .await;
        assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

        let last = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/3/image?width=10&height=10",
            vec![],
        )
        .await;
        assert_eq!(last.status(), StatusCode::OK);

        let past_end = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/4/image?width=10&height=10",
            vec![],
        )
        .await;
        assert_eq!(past_end.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(past_end).await["error"], "render_failure");
    }

    #[tokio::test]
    async fn test_image_query_must_be_consistent() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 1).await;

        let response = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/image?width=10",
            vec![],
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_render_tile() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 1).await;

        let response = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/tile?x=100&y=200&width=256&height=128&scale=2",
            vec![],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-image-width"), "256");
        assert_eq!(header(&response, "x-image-height"), "128");

        let bad_scale = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/tile?x=0&y=0&width=256&height=128&scale=0",
            vec![],
        )
        .await;
        assert_eq!(bad_scale.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(bad_scale).await["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_unknown_document_is_404() {
        let (_, router) = test_app();

        let response = send(&router, Method::GET, "/api/v1/documents/nope/pages", vec![]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["error"], "not_found");
        assert!(body["message"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_garbage_upload_is_422_and_clears_identity() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 1).await;

        let response = send(
            &router,
            Method::POST,
            "/api/v1/documents/doc1",
            b"garbage".to_vec(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(response).await["error"], "load_failure");

        let response = send(&router, Method::GET, "/api/v1/documents/doc1/pages", vec![]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (_, router) = test_app();
        let response = send(&router, Method::POST, "/api/v1/documents/doc1", vec![]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (state, router) = test_app();
        open_letter(&router, "doc1", 2).await;

        for _ in 0..2 {
            let response = send(&router, Method::DELETE, "/api/v1/documents/doc1", vec![]).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = send(
            &router,
            Method::GET,
            "/api/v1/documents/doc1/pages/1/image?width=10&height=10",
            vec![],
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.viewer().document_ids().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let (_, router) = test_app();
        open_letter(&router, "doc1", 1).await;

        let response = send(&router, Method::GET, "/health", vec![]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["engine"], "fake");
        assert_eq!(body["openDocuments"], 1);
    }
}
