//! Shared fixtures for unit and route tests

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::formats::epub::{EpubError, HtmlRenderer, PageSetup};

/// A valid 1x1 transparent PNG
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0x60, 0xf8, 0x5f, 0x0f, 0x00, 0x02, 0x87, 0x01, 0x80, 0xeb, 0x47, 0xba, 0x92, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const MINIMAL_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:00000000-0000-0000-0000-000000000001</dc:identifier>
    <dc:title>Minimal</dc:title>
  </metadata>
  <manifest>
    <item id="chapter2" href="chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="images/cover.png" media-type="image/png"/>
    <item id="chapter1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="Styles/book.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="chapter1"/>
    <itemref idref="chapter2"/>
  </spine>
</package>"#;

const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>One</title><link rel="stylesheet" href="Styles/book.css"/></head>
<body><h1>Chapter One</h1><p><img src="images/cover.png" alt="Cover"/></p></body>
</html>"#;

const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Two</title></head>
<body><h1>Chapter Two</h1><p><a href="https://example.com/x">elsewhere</a></p></body>
</html>"#;

/// Build an EPUB-shaped ZIP: `mimetype` first and stored, then `entries`
pub fn epub_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("mimetype", stored).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();

    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

/// Two chapters (manifest lists chapter two first), one nested image, one stylesheet
pub fn minimal_epub() -> Vec<u8> {
    epub_archive(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", MINIMAL_OPF.as_bytes()),
        ("OEBPS/chapter1.xhtml", CHAPTER_ONE.as_bytes()),
        ("OEBPS/chapter2.xhtml", CHAPTER_TWO.as_bytes()),
        ("OEBPS/images/cover.png", PNG_1X1),
        ("OEBPS/Styles/book.css", b"body { margin: 0; }".as_slice()),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehaviour {
    /// Write a small PDF to the output path
    Succeed,
    /// Return a render error
    Fail,
    /// Return Ok without writing anything
    NoOutput,
    Sleep(Duration),
    Panic,
    /// Fail the startup self-test (and every render)
    Unavailable,
}

/// What the engine saw when it was invoked
#[derive(Debug, Clone)]
pub struct StubCall {
    pub html: String,
    /// Entries of the directory holding the combined document
    pub siblings: Vec<String>,
}

/// In-process stand-in for the PDF engine
pub struct StubRenderer {
    behaviour: StubBehaviour,
    calls: Mutex<Vec<StubCall>>,
}

impl StubRenderer {
    pub fn new(behaviour: StubBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().clone()
    }
}

impl HtmlRenderer for StubRenderer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn render_to_pdf(
        &self,
        html_path: &Path,
        output: &Path,
        _page: &PageSetup,
    ) -> Result<(), EpubError> {
        let html = std::fs::read_to_string(html_path)?;
        let siblings = std::fs::read_dir(html_path.parent().unwrap())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        self.calls.lock().push(StubCall { html, siblings });

        match self.behaviour {
            StubBehaviour::Succeed => {
                std::fs::write(output, b"%PDF-1.4\n% stub\n%%EOF\n")?;
                Ok(())
            }
            StubBehaviour::Fail | StubBehaviour::Unavailable => {
                Err(EpubError::Render("stub engine failure".to_string()))
            }
            StubBehaviour::NoOutput => Ok(()),
            StubBehaviour::Sleep(d) => {
                std::thread::sleep(d);
                std::fs::write(output, b"%PDF-1.4\n%%EOF\n")?;
                Ok(())
            }
            StubBehaviour::Panic => panic!("stub engine panicked"),
        }
    }

    fn self_test(&self) -> Result<(), EpubError> {
        match self.behaviour {
            StubBehaviour::Unavailable => {
                Err(EpubError::Render("stub engine not loaded".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Behaviour of the generated office converter script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOffice {
    /// Writes `<outdir>/<stem>.pdf` and exits 0
    Succeed,
    /// Prints to stderr and exits 1
    Fail,
    /// Exits 0 leaving an unrelated file in the output directory
    NoOutput,
    /// Never finishes a conversion
    Hang,
    /// Like `Succeed`, but holds a lock inside its profile directory for a
    /// second and fails when the lock is already taken
    LockProfile,
    /// Every invocation, `--version` included, exits 1
    Broken,
}

/// Write an executable shell script standing in for the office converter
#[cfg(unix)]
pub fn fake_office(dir: &Path, behaviour: FakeOffice) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let convert = match behaviour {
        FakeOffice::Succeed => SUCCEED.to_string(),
        FakeOffice::Fail => {
            "echo \"Error: source file could not be loaded\" >&2\nexit 1".to_string()
        }
        FakeOffice::NoOutput => {
            "echo \"convert $input\"\ntouch \"$outdir/unexpected.txt\"\nexit 0".to_string()
        }
        FakeOffice::Hang => "exec sleep 30".to_string(),
        FakeOffice::LockProfile => format!("{}\n{}", LOCK_PROFILE, SUCCEED),
        FakeOffice::Broken => "exit 1".to_string(),
    };
    let version = match behaviour {
        FakeOffice::Broken => "exit 1",
        _ => "echo \"LibreOffice 7.6.4.1 fake\"; exit 0",
    };

    let script = format!(
        r#"#!/bin/sh
outdir=""
input=""
profile=""
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo version >> "$0.calls"; {version} ;;
    -env:UserInstallation=file://*) profile="${{1#-env:UserInstallation=file://}}" ;;
    --outdir) shift; outdir="$1" ;;
    --convert-to) shift ;;
    -*) ;;
    *) input="$1" ;;
  esac
  shift
done
{convert}
"#
    );

    let path = dir.join("fake-soffice");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Number of `--version` queries the script at `path` has answered
#[cfg(unix)]
pub fn version_queries(path: &Path) -> usize {
    let mut calls = path.as_os_str().to_owned();
    calls.push(".calls");
    std::fs::read_to_string(PathBuf::from(calls))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

const LOCK_PROFILE: &str = r#"if ! mkdir "$profile/.lock" 2>/dev/null; then
  echo "profile locked" >&2
  exit 81
fi
sleep 1
rmdir "$profile/.lock""#;

const SUCCEED: &str = r#"name=$(basename "$input")
stem="${name%.*}"
echo "convert $input -> $outdir/$stem.pdf using filter : impress_pdf_Export"
printf '%%PDF-1.4\n%% fake\n%%%%EOF\n' > "$outdir/$stem.pdf"
exit 0"#;
