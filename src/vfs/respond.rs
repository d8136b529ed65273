//! Shape VFS results into responses

use warp::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::response::{ApiResponse, ResponseBody};
use crate::transport::{ByteRange, FileContent, FileData, VfsArgs, VfsData, VfsMethod};
use crate::vfs::mime::data_url;

/// Parse a `Range` header against a resource of `total` bytes.
///
/// Only the first range of a set is honored. `bytes=N-` runs to the end and
/// `bytes=-N` selects the last `N` bytes.
pub fn parse_range(header: &str, total: u64) -> Result<ByteRange> {
    let unsatisfiable = || WebdeskError::RangeNotSatisfiable(format!("bytes */{}", total));

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(unsatisfiable)?;
    let first = spec.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if total == 0 {
        return Err(unsatisfiable());
    }

    let range = if start.is_empty() {
        let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        ByteRange {
            start: total.saturating_sub(suffix),
            end: total - 1,
        }
    } else {
        let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
        let end: u64 = if end.is_empty() {
            total - 1
        } else {
            end.parse().map_err(|_| unsatisfiable())?
        };
        ByteRange { start, end }
    };

    if range.start > range.end || range.start >= total || range.end >= total {
        return Err(unsatisfiable());
    }

    Ok(range)
}

/// Turn a transport result into a response.
///
/// JSON results are wrapped as `{result}`. Files stream with range support,
/// or are sent whole (as raw bytes, or as a data URL when `raw` is off).
pub async fn respond(
    ctx: &RequestContext,
    method: VfsMethod,
    args: &VfsArgs,
    data: VfsData,
) -> Result<ApiResponse> {
    match data {
        VfsData::Json(value) => Ok(ApiResponse::result(value)),
        VfsData::File(file) => {
            let download = args.download || method == VfsMethod::Download;
            respond_file(ctx, file, download).await
        }
    }
}

async fn respond_file(ctx: &RequestContext, file: FileData, download: bool) -> Result<ApiResponse> {
    let response = match file.content {
        FileContent::Stream(resource) => {
            let range = match ctx.range_header() {
                Some(header) if !download => Some(parse_range(header, file.size)?),
                _ => None,
            };

            let response = match range {
                Some(range) => {
                    let stream = resource.open(Some(range)).await?;
                    ApiResponse::stream(206, stream)
                        .with_header(
                            CONTENT_RANGE.as_str(),
                            format!("bytes {}-{}/{}", range.start, range.end, file.size),
                        )
                        .with_header(CONTENT_LENGTH.as_str(), range.length().to_string())
                }
                None => {
                    let stream = resource.open(None).await?;
                    let response = ApiResponse::stream(200, stream);
                    if file.size > 0 {
                        response.with_header(CONTENT_LENGTH.as_str(), file.size.to_string())
                    } else {
                        response
                    }
                }
            };
            response
                .with_header(ACCEPT_RANGES.as_str(), "bytes")
                .with_header(CONTENT_TYPE.as_str(), file.mime.as_str())
        }
        FileContent::Bytes(data) if !file.raw => ApiResponse::new(
            200,
            ResponseBody::Bytes(data_url(&file.mime, &data).into()),
        )
        .with_header(CONTENT_TYPE.as_str(), "text/plain"),
        FileContent::Bytes(data) => ApiResponse::bytes(&file.mime, data),
    };

    if download {
        Ok(response.with_header(
            CONTENT_DISPOSITION.as_str(),
            format!("attachment; filename=\"{}\"", file.filename.replace('"', "")),
        ))
    } else {
        Ok(response)
    }
}
