use log::{error, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub trait DataSender {
    fn send(&self, data: &str) -> std::io::Result<()>;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

impl DataSender for ConsoleSender {
    fn send(&self, data: &str) -> std::io::Result<()> {
        println!("{}", data);
        Ok(())
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends each result as one block to a file.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }
}

impl DataSender for FileSender {
    fn send(&self, data: &str) -> std::io::Result<()> {
        info!("📝 Writing {} bytes to {}", data.len(), self.file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| {
                error!("❌ Failed to open {}: {}", self.file_path, e);
                e
            })?;
        writeln!(file, "{}", data)
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}
