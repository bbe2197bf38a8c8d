//! # 服务端识别模块
//!
//! ## 设计思路
//!
//! 除本地推理外，也可以把手写图片上传给识别服务，由服务端返回预测数字。
//! 请求是一次性的：不重试、不排队，失败直接交给调用方呈现。
//!
//! ## 实现思路
//!
//! 1. 像素缓冲编码为 JPEG（质量 100；灰度保持灰度，其余格式去掉 alpha 转为 RGB）
//! 2. multipart 表单上传：字段 `mnist_image`，文件名 `mnist_file.jpg`，MIME `image/jpg`
//! 3. 非 2xx 视为网络错误；响应体按 `{ "filename", "pred_number" }` 解析

use std::io::Cursor;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::source::{ImageBuffer, PixelFormat};
use super::{ClassifierConfig, ClassifierError};

const UPLOAD_FIELD_NAME: &str = "mnist_image";
const UPLOAD_FILE_NAME: &str = "mnist_file.jpg";
const UPLOAD_MIME: &str = "image/jpg";
const JPEG_QUALITY: u8 = 100;

/// 服务端返回的识别结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPrediction {
    #[serde(rename = "filename")]
    pub file_name: String,
    #[serde(rename = "pred_number")]
    pub predicted_number: i64,
}

/// 识别服务客户端。
pub struct UploadClient {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl UploadClient {
    /// 按配置中的端点与超时构建客户端。
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| ClassifierError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            endpoint: config.upload_endpoint.clone(),
            timeout_secs: config.upload_timeout,
        })
    }

    /// 上传图片并返回服务端预测。
    pub async fn predict(&self, buffer: &ImageBuffer) -> Result<ServerPrediction, ClassifierError> {
        let jpeg = encode_jpeg(buffer)?;
        log::info!("📤 上传图片到识别服务 - 端点: {} 大小: {} 字节", self.endpoint, jpeg.len());

        let part = Part::bytes(jpeg)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)
            .map_err(|e| ClassifierError::Network(format!("无法构建上传表单：{}", e)))?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Network(format!("识别服务返回错误状态：{}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        let prediction = parse_prediction(&body)?;

        log::info!(
            "✅ 服务端识别完成：{}（文件 {}）",
            prediction.predicted_number,
            prediction.file_name
        );
        Ok(prediction)
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(format!("上传超时（{}秒）", self.timeout_secs))
        } else if e.is_connect() {
            ClassifierError::Network(format!("无法连接识别服务：{}", e))
        } else {
            ClassifierError::Network(format!("上传请求失败：{}", e))
        }
    }
}

fn parse_prediction(body: &[u8]) -> Result<ServerPrediction, ClassifierError> {
    serde_json::from_slice(body).map_err(|e| ClassifierError::Decode(format!("识别服务响应无法解析：{}", e)))
}

/// 把像素缓冲编码为 JPEG。
pub fn encode_jpeg(buffer: &ImageBuffer) -> Result<Vec<u8>, ClassifierError> {
    let (samples, color) = match buffer.format() {
        PixelFormat::Gray8 => (buffer.to_packed_vec()?, ExtendedColorType::L8),
        format => (packed_rgb(buffer, format), ExtendedColorType::Rgb8),
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    encoder
        .encode(&samples, buffer.width(), buffer.height(), color)
        .map_err(|e| ClassifierError::Decode(format!("JPEG 编码失败：{}", e)))?;

    Ok(cursor.into_inner())
}

fn packed_rgb(buffer: &ImageBuffer, format: PixelFormat) -> Vec<u8> {
    let [r, g, b] = format.rgb_offsets().unwrap_or([0, 0, 0]);
    let channels = format.channels();
    let mut out = Vec::with_capacity(buffer.width() as usize * buffer.height() as usize * 3);
    for y in 0..buffer.height() {
        for pixel in buffer.row(y).chunks_exact(channels) {
            out.extend_from_slice(&[pixel[r], pixel[g], pixel[b]]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn config_for(endpoint: String) -> ClassifierConfig {
        ClassifierConfig {
            upload_endpoint: endpoint,
            upload_timeout: 5,
            connect_timeout: 2,
            ..ClassifierConfig::default()
        }
    }

    /// 读取完整的 HTTP 请求（头 + Content-Length 指定的体，或直到 chunked 结束标记）。
    fn read_request(stream: &mut std::net::TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).expect("read request failed");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);

            let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok());

            match content_length {
                Some(len) if request.len() >= header_end + 4 + len => break,
                None if request.ends_with(b"0\r\n\r\n") => break,
                _ => {}
            }
        }
        request
    }

    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let request = read_request(&mut stream);

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("write response failed");
            stream.flush().expect("flush failed");
            request
        });

        (format!("http://127.0.0.1:{}/mnist", addr.port()), server)
    }

    fn digit_buffer() -> ImageBuffer {
        ImageBuffer::new(8, 8, PixelFormat::Bgra8, vec![200; 8 * 8 * 4]).expect("buffer")
    }

    #[test]
    fn gray_jpeg_stays_gray() {
        let buffer = ImageBuffer::new(4, 4, PixelFormat::Gray8, vec![128; 16]).expect("buffer");
        let jpeg = encode_jpeg(&buffer).expect("encode jpeg");
        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg");
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn bgra_jpeg_drops_alpha() {
        let jpeg = encode_jpeg(&digit_buffer()).expect("encode jpeg");
        assert_eq!(infer::get(&jpeg).map(|kind| kind.mime_type()), Some("image/jpeg"));
        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg");
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn prediction_json_uses_server_field_names() {
        let parsed = parse_prediction(br#"{"filename":"mnist_file.jpg","pred_number":3}"#).expect("parse");
        assert_eq!(
            parsed,
            ServerPrediction {
                file_name: "mnist_file.jpg".to_string(),
                predicted_number: 3,
            }
        );
        assert!(matches!(parse_prediction(b"not json"), Err(ClassifierError::Decode(_))));
    }

    #[tokio::test]
    async fn predict_posts_multipart_and_parses_reply() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", r#"{"filename":"mnist_file.jpg","pred_number":7}"#);

        let client = UploadClient::new(&config_for(endpoint)).expect("client");
        let result = client.predict(&digit_buffer()).await;
        let request = server.join().expect("server thread failed");

        let prediction = result.expect("prediction");
        assert_eq!(prediction.predicted_number, 7);

        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /mnist"));
        assert!(text.contains("name=\"mnist_image\""));
        assert!(text.contains("filename=\"mnist_file.jpg\""));
        assert!(text.to_lowercase().contains("content-type: image/jpg"));
    }

    #[tokio::test]
    async fn error_status_is_a_network_error() {
        let (endpoint, server) = serve_once("HTTP/1.1 500 Internal Server Error", "{}");

        let client = UploadClient::new(&config_for(endpoint)).expect("client");
        let result = client.predict(&digit_buffer()).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ClassifierError::Network(_))));
    }
}
