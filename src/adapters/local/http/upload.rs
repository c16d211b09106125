use axum::body::Bytes;
use axum::BoxError;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::{Component, Path};
use tokio::{fs::File, io::AsyncWriteExt, io::BufWriter};
use tokio_util::io::StreamReader;

/// Save a `Stream` to a file, returning the number of bytes written.
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

/// A stored file name must be exactly one plain path component.
pub fn path_is_valid(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stream_to_file() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("upload.mp4");

        let chunks = vec![
            Ok::<Bytes, io::Error>(Bytes::from("Hello, ")),
            Ok(Bytes::from("world!")),
        ];
        let written = stream_to_file(&file_path, stream::iter(chunks)).await.unwrap();

        assert_eq!(written, 13);
        assert_eq!(std::fs::read_to_string(file_path).unwrap(), "Hello, world!");
    }

    #[tokio::test]
    async fn test_stream_to_file_error() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("upload.mp4");

        let result = stream_to_file(&file_path, stream::iter(vec![Err("client went away")])).await;
        assert_eq!(result.unwrap_err().to_string(), "client went away");
    }

    #[test]
    fn test_valid_path() {
        assert!(path_is_valid(&PathBuf::from("0f3a_movie.mp4")));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(!path_is_valid(&PathBuf::from("../movie.mp4")));
        assert!(!path_is_valid(&PathBuf::from("dir1/movie.mp4")));
        assert!(!path_is_valid(&PathBuf::from("/movie.mp4")));
        assert!(!path_is_valid(&PathBuf::from("")));
    }
}
