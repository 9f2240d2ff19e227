/// Container sniffing and decoding of image payloads, including the generic PNG/JPEG path.
pub mod texture_loader;
