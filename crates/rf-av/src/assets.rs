//! Asset resolution.
//!
//! Audio assets referenced by rendered frames must exist as local files
//! before the final stitch can mux them. Remote references are downloaded
//! into the working directory; local references are checked and passed
//! through untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use rf_core::{AssetReference, DownloadProgress, Error, Result};

/// Resolve every asset reference to a local file path.
///
/// References are deduplicated by source, keeping first-seen order, so an
/// asset used by many frames is fetched once. `on_progress` is invoked with
/// per-asset completion fractions as downloads advance.
///
/// # Errors
///
/// A missing local file or a failed download aborts resolution; already
/// downloaded files are left in place.
pub async fn resolve_assets(
    assets: &[AssetReference],
    dir: &Path,
    mut on_progress: impl FnMut(DownloadProgress),
) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let unique: Vec<&AssetReference> = assets
        .iter()
        .filter(|a| seen.insert(a.src.clone()))
        .collect();

    let mut resolved = Vec::with_capacity(unique.len());
    for (i, asset) in unique.iter().enumerate() {
        if asset.is_remote() {
            let dest = dir.join(format!("asset-{i}-{}", file_name_for(&asset.src)));
            tracing::debug!("downloading {} to {}", asset.src, dest.display());
            download(&asset.src, &dest, &mut on_progress).await?;
            resolved.push(dest);
        } else {
            let path = PathBuf::from(&asset.src);
            if !path.exists() {
                return Err(Error::download(
                    asset.src.clone(),
                    "local asset file does not exist",
                ));
            }
            on_progress(DownloadProgress {
                name: asset.src.clone(),
                progress: 1.0,
            });
            resolved.push(path);
        }
    }
    Ok(resolved)
}

async fn download(
    url: &str,
    dest: &Path,
    on_progress: &mut impl FnMut(DownloadProgress),
) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::download(url, e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::download(
            url,
            format!("server responded with {}", response.status()),
        ));
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(dest).await?;
    let mut received: u64 = 0;
    let mut response = response;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::download(url, e.to_string()))?
    {
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            on_progress(DownloadProgress {
                name: url.to_string(),
                progress: (received as f64 / total as f64).min(1.0),
            });
        }
    }

    file.flush().await?;
    on_progress(DownloadProgress {
        name: url.to_string(),
        progress: 1.0,
    });
    Ok(())
}

fn file_name_for(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("asset")
        .to_string()
}
