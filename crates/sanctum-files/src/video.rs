//! Container probing for video attachments.
//!
//! Walks ISO-BMFF boxes (MP4 / QuickTime) for `moov/mvhd` duration and
//! `moov/trak/tkhd` dimensions, and recognizes the EBML header used by
//! WebM / Matroska. No frames are decoded.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FileError, FileResult};

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const TOP_LEVEL_BOXES: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Seconds
    pub duration: Option<f64>,
}

#[derive(Debug, PartialEq)]
enum ProbeError {
    UnknownContainer,
    Truncated,
    NoMovieHeader,
}

/// Best effort: any failure or timeout yields empty metadata.
pub async fn extract(data: Bytes, timeout: Duration) -> VideoMetadata {
    match probe_blocking(data, timeout).await {
        Ok(meta) => meta,
        Err(reason) => {
            debug!(%reason, "video metadata unavailable");
            VideoMetadata::default()
        }
    }
}

/// Decodability check for previews.
pub async fn ensure_decodable(data: Bytes, timeout: Duration) -> FileResult<VideoMetadata> {
    probe_blocking(data, timeout).await.map_err(|reason| {
        debug!(%reason, "video probe failed");
        FileError::VideoNotDecodable
    })
}

async fn probe_blocking(data: Bytes, timeout: Duration) -> Result<VideoMetadata, String> {
    let task = tokio::task::spawn_blocking(move || probe(&data));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(meta))) => Ok(meta),
        Ok(Ok(Err(e))) => Err(format!("{e:?}")),
        Ok(Err(e)) => Err(format!("probe task failed: {e}")),
        Err(_) => Err(format!("probe timed out after {timeout:?}")),
    }
}

fn probe(data: &[u8]) -> Result<VideoMetadata, ProbeError> {
    if data.starts_with(&EBML_MAGIC) {
        return Ok(VideoMetadata::default());
    }
    let first = match Boxes::new(data).next() {
        Some(Ok(bx)) => bx,
        _ => return Err(ProbeError::UnknownContainer),
    };
    if !TOP_LEVEL_BOXES.iter().any(|t| **t == first.kind) {
        return Err(ProbeError::UnknownContainer);
    }

    let moov = find(data, b"moov")?.ok_or(ProbeError::NoMovieHeader)?;
    let mvhd = find(moov, b"mvhd")?.ok_or(ProbeError::NoMovieHeader)?;
    let mut meta = VideoMetadata {
        duration: parse_mvhd(mvhd)?,
        ..Default::default()
    };

    for bx in Boxes::new(moov) {
        let bx = bx?;
        if &bx.kind != b"trak" {
            continue;
        }
        if let Some(tkhd) = find(bx.body, b"tkhd")? {
            if let Some((w, h)) = parse_tkhd(tkhd)? {
                meta.width = Some(w);
                meta.height = Some(h);
                break;
            }
        }
    }
    Ok(meta)
}

struct Mp4Box<'a> {
    kind: [u8; 4],
    body: &'a [u8],
}

struct Boxes<'a> {
    rest: &'a [u8],
}

impl<'a> Boxes<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for Boxes<'a> {
    type Item = Result<Mp4Box<'a>, ProbeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let parsed = split_box(self.rest);
        match parsed {
            Ok((bx, rest)) => {
                self.rest = rest;
                Some(Ok(bx))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

fn split_box(data: &[u8]) -> Result<(Mp4Box<'_>, &[u8]), ProbeError> {
    let size = read_u32(data, 0)? as u64;
    let kind: [u8; 4] = data
        .get(4..8)
        .and_then(|k| k.try_into().ok())
        .ok_or(ProbeError::Truncated)?;
    let (header, total) = match size {
        0 => (8, data.len() as u64),
        1 => (16, read_u64(data, 8)?),
        n => (8, n),
    };
    if total < header || total > data.len() as u64 {
        return Err(ProbeError::Truncated);
    }
    let total = total as usize;
    Ok((
        Mp4Box {
            kind,
            body: &data[header as usize..total],
        },
        &data[total..],
    ))
}

fn find<'a>(data: &'a [u8], kind: &[u8; 4]) -> Result<Option<&'a [u8]>, ProbeError> {
    for bx in Boxes::new(data) {
        let bx = bx?;
        if &bx.kind == kind {
            return Ok(Some(bx.body));
        }
    }
    Ok(None)
}

fn parse_mvhd(body: &[u8]) -> Result<Option<f64>, ProbeError> {
    let version = *body.first().ok_or(ProbeError::Truncated)?;
    let (timescale, duration) = if version == 1 {
        (read_u32(body, 20)?, read_u64(body, 24)?)
    } else {
        (read_u32(body, 12)?, read_u32(body, 16)? as u64)
    };
    if timescale == 0 {
        return Ok(None);
    }
    Ok(Some(duration as f64 / timescale as f64))
}

fn parse_tkhd(body: &[u8]) -> Result<Option<(u32, u32)>, ProbeError> {
    let version = *body.first().ok_or(ProbeError::Truncated)?;
    let dims_at = if version == 1 { 88 } else { 76 };
    // 16.16 fixed point
    let width = read_u32(body, dims_at)? >> 16;
    let height = read_u32(body, dims_at + 4)? >> 16;
    if width == 0 || height == 0 {
        return Ok(None);
    }
    Ok(Some((width, height)))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, ProbeError> {
    data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or(ProbeError::Truncated)
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, ProbeError> {
    data.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or(ProbeError::Truncated)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    /// Minimal MP4: ftyp + moov(mvhd v0, trak(tkhd v0)) + mdat.
    pub(crate) fn tiny_mp4(timescale: u32, duration: u32, width: u32, height: u32) -> Vec<u8> {
        let mut mvhd = vec![0u8; 100];
        mvhd[12..16].copy_from_slice(&timescale.to_be_bytes());
        mvhd[16..20].copy_from_slice(&duration.to_be_bytes());

        let mut tkhd = vec![0u8; 84];
        tkhd[76..80].copy_from_slice(&(width << 16).to_be_bytes());
        tkhd[80..84].copy_from_slice(&(height << 16).to_be_bytes());

        let trak = mp4_box(b"trak", &mp4_box(b"tkhd", &tkhd));
        let mut moov_body = mp4_box(b"mvhd", &mvhd);
        moov_body.extend(trak);

        let mut out = mp4_box(b"ftyp", b"isom\0\0\0\0isomiso2");
        out.extend(mp4_box(b"moov", &moov_body));
        out.extend(mp4_box(b"mdat", &[0u8; 32]));
        out
    }

    #[test]
    fn test_parses_duration_and_dimensions() {
        let meta = probe(&tiny_mp4(1000, 12_500, 1280, 720)).unwrap();
        assert_eq!(meta.width, Some(1280));
        assert_eq!(meta.height, Some(720));
        assert_eq!(meta.duration, Some(12.5));
    }

    #[test]
    fn test_audio_only_track_has_no_dimensions() {
        let meta = probe(&tiny_mp4(600, 600, 0, 0)).unwrap();
        assert_eq!(meta.width, None);
        assert_eq!(meta.duration, Some(1.0));
    }

    #[test]
    fn test_ebml_is_recognized() {
        let mut webm = EBML_MAGIC.to_vec();
        webm.extend_from_slice(&[0x9F, 0x42, 0x86, 0x81, 0x01]);
        assert_eq!(probe(&webm).unwrap(), VideoMetadata::default());
    }

    #[test]
    fn test_garbage_and_truncation_fail() {
        assert_eq!(probe(b"definitely not a video"), Err(ProbeError::UnknownContainer));
        let mp4 = tiny_mp4(1000, 1000, 16, 16);
        assert!(probe(&mp4[..40]).is_err());
        assert!(probe(&[]).is_err());
    }

    #[test]
    fn test_largesize_box_is_supported() {
        let mut mvhd = vec![0u8; 100];
        mvhd[12..16].copy_from_slice(&10u32.to_be_bytes());
        mvhd[16..20].copy_from_slice(&20u32.to_be_bytes());
        let mvhd_box = mp4_box(b"mvhd", &mvhd);

        let mut moov = 1u32.to_be_bytes().to_vec();
        moov.extend_from_slice(b"moov");
        moov.extend_from_slice(&((mvhd_box.len() + 16) as u64).to_be_bytes());
        moov.extend(mvhd_box);

        assert_eq!(probe(&moov).unwrap().duration, Some(2.0));
    }

    #[tokio::test]
    async fn test_extract_degrades_to_empty() {
        let meta = extract(Bytes::from_static(b"junk"), Duration::from_secs(5)).await;
        assert_eq!(meta, VideoMetadata::default());
    }

    #[tokio::test]
    async fn test_ensure_decodable_rejects_garbage() {
        let err = ensure_decodable(Bytes::from_static(b"junk"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::VideoNotDecodable));
    }
}
