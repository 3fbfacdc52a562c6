use std::convert::Infallible;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot::Receiver;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use serde::{Deserialize, Serialize};

use image::{ImageBuffer, Rgba, RgbaImage};
use log::{error, info};

use crate::world::model::Bounds;
use crate::world::region_model::{Region, RegionModel, RegionSummary};
use crate::world::tiles::{Tile, REGION_SIZE};

const DEFAULT_TEXTURE_SIZE: usize = 128;
const MAX_SCALE: u32 = 16;


#[derive(Serialize, Deserialize, Debug)]
pub enum ApiRequest {
    RegionInfo { region_x: u8, region_y: u8 },
    TileInfo { region_x: u8, region_y: u8, plane: usize, x: usize, y: usize },
    RenderRegion { region_x: u8, region_y: u8, plane: usize, scale: Option<u32> },
    ModelInfo { id: u32 },
    RenderTexture { id: u32, size: Option<usize> },
}


#[derive(Serialize)]
pub enum ApiResponse {
    Error { err: String },
    RegionReply { summary: RegionSummary },
    TileReply { tile: Tile },
    ModelReply { id: u32, vertices: usize, faces: usize, textured_faces: usize, bounds: Bounds },
    #[serde(skip_serializing)]
    ImageReply { image: RgbaImage },
}

impl ApiResponse {
    fn error(err: impl ToString) -> Self {
        ApiResponse::Error { err: err.to_string() }
    }
}


#[derive(Clone)]
struct ApiHandler {
    model: Arc<RegionModel>,
}


impl ApiHandler {
    pub fn new(model: Arc<RegionModel>) -> Self {
        Self { model }
    }


    async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        // reading the request body as bytes
        let body_bytes = match hyper::body::to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Api::error body parsing - {err}");
                return Self::serialize_response(&ApiResponse::error(format!("Failed to read request body: {err}")));
            }
        };

        let api_response = match serde_json::from_slice::<ApiRequest>(&body_bytes) {
            Ok(api_request) => match api_request {
                ApiRequest::RegionInfo { region_x, region_y }
                    => self.handle_region_info(region_x, region_y).await,
                ApiRequest::TileInfo { region_x, region_y, plane, x, y }
                    => self.handle_tile_info(region_x, region_y, plane, x, y).await,
                ApiRequest::RenderRegion { region_x, region_y, plane, scale }
                    => self.handle_render_region(region_x, region_y, plane, scale).await,
                ApiRequest::ModelInfo { id }
                    => self.handle_model_info(id),
                ApiRequest::RenderTexture { id, size }
                    => self.handle_render_texture(id, size).await,
            },

            // parsing failed, make a response that will include a description of the error
            Err(err) => {
                error!("Api::error request parsing - {err}");
                ApiResponse::error(format!("Failed to parse request body: {err}"))
            }
        };

        Self::serialize_response(&api_response)
    }


    fn with_content_type(body: Body, content_type: &'static str) -> Response<Body> {
        let mut response = Response::new(body);
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }

    fn serialize_response(response: &ApiResponse) -> Result<Response<Body>, Infallible> {
        match response {
            // images go out as png, everything else as json
            ApiResponse::ImageReply { image } => {
                let mut write_buffer = Cursor::new(Vec::with_capacity(image.width() as usize * image.height() as usize * 4));
                match image.write_to(&mut write_buffer, image::ImageOutputFormat::Png) {
                    Ok(()) => Ok(Self::with_content_type(Body::from(write_buffer.into_inner()), "image/png")),
                    Err(err) => {
                        error!("Api::error png encoding - {err}");
                        Self::serialize_response(&ApiResponse::error(err))
                    }
                }
            }

            _ => {
                let response_body = serde_json::to_string(response).unwrap_or_else(|err| {
                    error!("Api::error response serialization - {err}");
                    format!("{{\"Error\":{{\"err\":\"{err}\"}}}}")
                });
                Ok(Self::with_content_type(Body::from(response_body), "application/json"))
            }
        }
    }


    /// Decodes (or fetches) a region off the async runtime.
    async fn region<T, F>(&self, region_x: u8, region_y: u8, f: F) -> ApiResponse
    where
        T: Into<ApiResponse> + Send + 'static,
        F: FnOnce(&Region) -> Result<T, String> + Send + 'static,
    {
        let model = self.model.clone();
        let task = tokio::task::spawn_blocking(move || {
            let region = model.region(region_x, region_y).map_err(|err| err.to_string())?;
            f(region.as_ref())
        });

        match task.await {
            Ok(Ok(reply)) => reply.into(),
            Ok(Err(err)) => ApiResponse::error(err),
            Err(err) => {
                error!("Api::error region task - {err}");
                ApiResponse::error(err)
            }
        }
    }

    // Handlers
    async fn handle_region_info(&self, region_x: u8, region_y: u8) -> ApiResponse {
        info!("Api::region_info {region_x}_{region_y}");
        self.region(region_x, region_y, |region| Ok(ApiResponse::RegionReply { summary: region.summary() })).await
    }


    async fn handle_tile_info(&self, region_x: u8, region_y: u8, plane: usize, x: usize, y: usize) -> ApiResponse {
        info!("Api::tile_info {region_x}_{region_y} plane {plane} at {x}, {y}");
        self.region(region_x, region_y, move |region| match region.tile(plane, x, y) {
            Some(tile) => Ok(ApiResponse::TileReply { tile: *tile }),
            None => Err(format!("no tile at plane {plane}, {x}, {y}")),
        })
        .await
    }


    async fn handle_render_region(&self, region_x: u8, region_y: u8, plane: usize, scale: Option<u32>) -> ApiResponse {
        let scale = scale.unwrap_or(4).clamp(1, MAX_SCALE);
        info!("Api::render_region {region_x}_{region_y} plane {plane} scale {scale}");
        let model = self.model.clone();

        self.region(region_x, region_y, move |region| {
            let floors = &model.data.floors;
            let size = REGION_SIZE as u32 * scale;
            let mut image: RgbaImage = ImageBuffer::new(size, size);

            for x in 0..REGION_SIZE {
                for y in 0..REGION_SIZE {
                    let Some(tile) = region.tile(plane, x, y) else {
                        return Err(format!("no plane {plane}"));
                    };
                    let overlay = tile.overlay.and_then(|o| floors.overlay(o.id)).map(|floor| floor.rgb);
                    let colour = overlay.or(tile.colour.map(|c| c.rgb_lit));

                    let pixel = match colour {
                        Some(rgb) => Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 255]),
                        None => Rgba([0, 0, 0, 0]),
                    };
                    // north up
                    let px = x as u32 * scale;
                    let py = (REGION_SIZE - 1 - y) as u32 * scale;
                    for dx in 0..scale {
                        for dy in 0..scale {
                            image.put_pixel(px + dx, py + dy, pixel);
                        }
                    }
                }
            }

            Ok(ApiResponse::ImageReply { image })
        })
        .await
    }


    fn handle_model_info(&self, id: u32) -> ApiResponse {
        info!("Api::model_info {id}");
        match self.model.data.template(id) {
            Some(model) => ApiResponse::ModelReply {
                id,
                vertices: model.vertices.len(),
                faces: model.faces.len(),
                textured_faces: model.textured_faces(),
                bounds: model.bounds(),
            },
            None => ApiResponse::error(format!("model {id} is missing or undecodable")),
        }
    }


    async fn handle_render_texture(&self, id: u32, size: Option<usize>) -> ApiResponse {
        let size = size.unwrap_or(DEFAULT_TEXTURE_SIZE);
        info!("Api::render_texture {id} size {size}");
        let model = self.model.clone();

        let task = tokio::task::spawn_blocking(move || {
            let data = &model.data;
            let def = data.textures.get(id).ok_or_else(|| format!("no texture {id}"))?;
            let pixels = def
                .generate_pixels(&data.sprites, data.brightness, size)
                .ok_or_else(|| format!("texture {id} cannot be generated at size {size}"))?;

            let image: RgbaImage = ImageBuffer::from_fn(size as u32, size as u32, |x, y| {
                let rgb = pixels[y as usize * size + x as usize];
                let alpha = if rgb == 0 { 0 } else { 255 };
                Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, alpha])
            });
            Ok::<_, String>(image)
        });

        match task.await {
            Ok(Ok(image)) => ApiResponse::ImageReply { image },
            Ok(Err(err)) => ApiResponse::error(err),
            Err(err) => ApiResponse::error(err),
        }
    }
}


fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

async fn handle_request(api: Arc<ApiHandler>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::POST && req.uri().path() == "/api/" {
        let api = api.as_ref();
        return api.handle_request(req).await;
    }

    Ok(not_found())
}


async fn http_svc(model: Arc<RegionModel>, port: u16, http_stop: Receiver<()>) {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let api_handler = Arc::new(ApiHandler::new(model));

    let make_service = make_service_fn(move |_conn| {
        let api = api_handler.clone(); // clone the Arc reference
        let service = service_fn(move |req| {
            handle_request(api.clone(), req) // use the Arc reference
        });

        async move { Ok::<_, Infallible>(service) }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_service).with_graceful_shutdown(async {
            http_stop.await.ok();
        }),
        Err(err) => {
            error!("cannot bind {addr}: {err}");
            return;
        }
    };

    info!("Listening on http://{}", addr);
    if let Err(e) = server.await {
        error!("server error: {}", e);
    } else {
        info!("server stopped successfully")
    }
}

pub fn http_server_service(model: Arc<RegionModel>, port: u16, http_stop: Receiver<()>) {
    // start http service in single thread runtime
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("http_server_thread")
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            error!("cannot start runtime: {err}");
            return;
        }
    };

    // block thread while service is running
    rt.block_on(http_svc(model, port, http_stop));
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_from_tagged_json() {
        let request: ApiRequest = serde_json::from_str(r#"{"TileInfo":{"region_x":50,"region_y":50,"plane":0,"x":3,"y":4}}"#).unwrap();
        assert!(matches!(request, ApiRequest::TileInfo { region_x: 50, plane: 0, x: 3, y: 4, .. }));

        let request: ApiRequest = serde_json::from_str(r#"{"RenderTexture":{"id":12,"size":null}}"#).unwrap();
        assert!(matches!(request, ApiRequest::RenderTexture { id: 12, size: None }));

        assert!(serde_json::from_str::<ApiRequest>(r#"{"Unknown":{}}"#).is_err());
    }

    #[test]
    fn errors_serialize_as_json() {
        let response = ApiHandler::serialize_response(&ApiResponse::error("boom")).unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn images_serialize_as_png() {
        let image: RgbaImage = ImageBuffer::new(2, 2);
        let response = ApiHandler::serialize_response(&ApiResponse::ImageReply { image }).unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
    }
}
