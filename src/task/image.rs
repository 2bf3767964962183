use std::fs;
use std::io::Cursor;

use camino::{Utf8Path, Utf8PathBuf};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat, ImageReader};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

use crate::config::Category;
use crate::core::Hash32;
use crate::pipeline::{Artifact, Pipeline, Step};
use crate::task::{Report, TaskContext};

const DIR_CACHE: &str = ".cache/images/";

/// Quality used for lossy formats.
const JPEG_QUALITY: u8 = 80;

/// Errors that can occur when processing images.
#[derive(Debug, Error)]
pub enum ImageError {
    /// An I/O error occurred while reading or writing image files.
    #[error("IO error on '{0}': {1}")]
    Io(Utf8PathBuf, #[source] std::io::Error),

    /// An error occurred during image decoding or encoding.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// Compresses every image below the source directory, keeping the directory
/// layout. Files which are not PNG or JPEG are copied as they are.
pub fn run(ctx: &TaskContext) -> anyhow::Result<Report> {
    let src = ctx.config.src(Category::Images);
    let dst = ctx.config.dest(Category::Images);
    let cache = ctx.config.root.join(DIR_CACHE);

    let files = crate::output::list_files(&src)?;
    fs::create_dir_all(&cache).map_err(|e| ImageError::Io(cache.clone(), e))?;

    let pipeline = Pipeline::new().then(Compress);

    let written = files
        .par_iter()
        .map(|file| -> anyhow::Result<Utf8PathBuf> {
            let target = crate::output::rebase(file, &src, &dst);
            let bytes = fs::read(file).map_err(|e| ImageError::Io(file.clone(), e))?;

            let data = match format_of(file) {
                Some(_) => optimize_cached(&pipeline, &cache, file, bytes)?,
                None => bytes,
            };

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ImageError::Io(parent.to_path_buf(), e))?;
            }
            fs::write(&target, data).map_err(|e| ImageError::Io(target.clone(), e))?;

            Ok(target)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Report::new(written))
}

/// Looks up the encoded image by the hash of its source, encoding it on a
/// cache miss.
fn optimize_cached(
    pipeline: &Pipeline,
    cache: &Utf8Path,
    file: &Utf8Path,
    bytes: Vec<u8>,
) -> anyhow::Result<Vec<u8>> {
    let hash = Hash32::hash(&bytes).to_hex();
    let ext = file.extension().unwrap_or("bin").to_ascii_lowercase();
    let path_cache = cache.join(format!("{hash}.{ext}"));

    if let Ok(data) = fs::read(&path_cache) {
        return Ok(data);
    }

    let result = pipeline.run(Artifact::new(file, bytes))?;
    write_cache(&path_cache, file, &result.bytes)?;

    Ok(result.bytes)
}

/// Writes a cache entry under a name private to this process and `source`,
/// then moves it into place. Readers only ever see complete entries.
fn write_cache(path: &Utf8Path, source: &Utf8Path, data: &[u8]) -> Result<(), ImageError> {
    let tag = Hash32::hash(source.as_str()).to_hex();
    let tmp = Utf8PathBuf::from(format!("{path}.{}-{}.tmp", std::process::id(), &tag[..16]));

    fs::write(&tmp, data).map_err(|e| ImageError::Io(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| ImageError::Io(path.to_path_buf(), e))
}

fn format_of(path: &Utf8Path) -> Option<ImageFormat> {
    match ImageFormat::from_extension(path.extension()?)? {
        format @ (ImageFormat::Png | ImageFormat::Jpeg) => Some(format),
        _ => None,
    }
}

/// Re-encodes PNG losslessly at the best compression and JPEG lossily at
/// [`JPEG_QUALITY`]. The original bytes win if they are already smaller.
struct Compress;

impl Step for Compress {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
        let Some(format) = format_of(&input.source) else {
            return Ok(input);
        };

        let img = ImageReader::with_format(Cursor::new(&input.bytes), format)
            .decode()
            .map_err(ImageError::Image)?;
        let mut out = Vec::new();

        match format {
            ImageFormat::Png => {
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
                    .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())?;
            }
            _ => {
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )?;
            }
        }

        if out.len() >= input.bytes.len() {
            return Ok(input);
        }

        Ok(Artifact {
            bytes: out,
            ..input
        })
    }
}
