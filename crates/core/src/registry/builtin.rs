//! The built-in recipe table.
//!
//! Codec choices follow what the chat bot shipped with: 320k MP3, Vorbis for
//! OGG, H.264/AAC for MP4 and MKV, MPEG-4/MP3 for AVI, and pandoc with the
//! xelatex engine for PDF output.

use crate::config::ToolsConfig;
use crate::format::Format;

use super::recipe::{Recipe, ToolKind};

const AUDIO_SOURCES: [Format; 6] = [
    Format::Mp3,
    Format::Ogg,
    Format::Wav,
    Format::Flac,
    Format::M4a,
    Format::Mka,
];
const AUDIO_TARGETS: [Format; 4] = [Format::Mp3, Format::Ogg, Format::Wav, Format::Flac];

const VIDEO_SOURCES: [Format; 6] = [
    Format::Mp4,
    Format::Mkv,
    Format::Webm,
    Format::Avi,
    Format::Mov,
    Format::Ogv,
];
const VIDEO_TARGETS: [Format; 3] = [Format::Mp4, Format::Avi, Format::Mkv];

const IMAGE_FORMATS: [Format; 4] = [Format::Jpeg, Format::Png, Format::Webp, Format::Bmp];
/// Images the typesetter can embed in a page.
const PAGE_IMAGE_SOURCES: [Format; 2] = [Format::Jpeg, Format::Png];

/// One-page document placing the image, fitted to the text block. xelatex
/// reads a first argument starting with `\` as source text.
const IMAGE_PAGE_SOURCE: &str = r#"\documentclass{article}\usepackage[margin=1cm]{geometry}\usepackage{graphicx}\pagestyle{empty}\begin{document}\centering\includegraphics[width=\linewidth,height=\textheight,keepaspectratio]{"{input}"}\end{document}"#;

const DOCUMENT_SOURCES: [Format; 6] = [
    Format::Docx,
    Format::Odt,
    Format::Rtf,
    Format::Html,
    Format::Markdown,
    Format::Txt,
];
const DOCUMENT_TARGETS: [Format; 3] = [Format::Pdf, Format::Docx, Format::Txt];

fn audio_codec_args(target: Format) -> &'static [&'static str] {
    match target {
        Format::Mp3 => &["-c:a", "libmp3lame", "-b:a", "320k"],
        Format::Ogg => &["-c:a", "libvorbis"],
        Format::Wav => &["-c:a", "pcm_s16le"],
        Format::Flac => &["-c:a", "flac"],
        _ => &[],
    }
}

fn video_codec_args(target: Format) -> &'static [&'static str] {
    match target {
        Format::Avi => &["-c:v", "mpeg4", "-c:a", "libmp3lame"],
        _ => &["-c:v", "libx264", "-c:a", "aac"],
    }
}

fn image_args(target: Format) -> &'static [&'static str] {
    match target {
        Format::Jpeg => &["-frames:v", "1", "-q:v", "2"],
        _ => &["-frames:v", "1"],
    }
}

/// pandoc reader name for a source document.
fn pandoc_reader(source: Format) -> &'static str {
    match source {
        Format::Docx => "docx",
        Format::Odt => "odt",
        Format::Rtf => "rtf",
        Format::Html => "html",
        Format::Latex => "latex",
        // plain text goes through the markdown reader
        _ => "markdown",
    }
}

fn transcoder_recipe(tools: &ToolsConfig, source: Format, target: Format, codec: &[&str]) -> Recipe {
    let mut args = vec![
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "error",
        "-i",
        "{input}",
    ];
    args.extend_from_slice(codec);
    args.push("{output}");

    Recipe::new(
        source,
        target,
        ToolKind::Transcoder,
        tools.transcoder.program.clone(),
        args,
    )
    .with_max_duration(tools.transcoder.timeout())
}

fn markup_recipe(tools: &ToolsConfig, source: Format, target: Format) -> Recipe {
    let mut args = vec![
        "-f".to_string(),
        pandoc_reader(source).to_string(),
    ];
    match target {
        Format::Pdf => args.push(format!(
            "--pdf-engine={}",
            tools.typesetter.program.display()
        )),
        Format::Txt => args.extend(["-t".to_string(), "plain".to_string()]),
        _ => args.extend(["-t".to_string(), target.extension().to_string()]),
    }
    args.extend([
        "-o".to_string(),
        "{output}".to_string(),
        "{input}".to_string(),
    ]);

    Recipe::new(
        source,
        target,
        ToolKind::Markup,
        tools.markup.program.clone(),
        args,
    )
    .with_max_duration(tools.markup.timeout())
}

fn typesetter_recipe(tools: &ToolsConfig) -> Recipe {
    Recipe::new(
        Format::Latex,
        Format::Pdf,
        ToolKind::Typesetter,
        tools.typesetter.program.clone(),
        [
            "-interaction=nonstopmode",
            "-halt-on-error",
            "-output-directory={output_dir}",
            "{input}",
        ],
    )
    .with_max_duration(tools.typesetter.timeout())
}

fn image_page_recipe(tools: &ToolsConfig, source: Format) -> Recipe {
    Recipe::new(
        source,
        Format::Pdf,
        ToolKind::Typesetter,
        tools.typesetter.program.clone(),
        [
            "-interaction=nonstopmode",
            "-halt-on-error",
            "-output-directory={output_dir}",
            "-jobname=output",
            IMAGE_PAGE_SOURCE,
        ],
    )
    .with_max_duration(tools.typesetter.timeout())
}

/// Every built-in recipe. No pair appears twice and no format maps to itself.
pub fn builtin_recipes(tools: &ToolsConfig) -> Vec<Recipe> {
    let mut recipes = Vec::new();

    for source in AUDIO_SOURCES {
        for target in AUDIO_TARGETS.into_iter().filter(|t| *t != source) {
            let mut codec = vec!["-vn"];
            codec.extend_from_slice(audio_codec_args(target));
            recipes.push(transcoder_recipe(tools, source, target, &codec));
        }
    }

    for source in VIDEO_SOURCES {
        for target in VIDEO_TARGETS.into_iter().filter(|t| *t != source) {
            recipes.push(transcoder_recipe(
                tools,
                source,
                target,
                video_codec_args(target),
            ));
        }
        // soundtrack extraction
        let mut codec = vec!["-vn"];
        codec.extend_from_slice(audio_codec_args(Format::Mp3));
        recipes.push(transcoder_recipe(tools, source, Format::Mp3, &codec));
    }

    for source in IMAGE_FORMATS {
        for target in IMAGE_FORMATS.into_iter().filter(|t| *t != source) {
            recipes.push(transcoder_recipe(tools, source, target, image_args(target)));
        }
    }
    for source in PAGE_IMAGE_SOURCES {
        recipes.push(image_page_recipe(tools, source));
    }

    for source in DOCUMENT_SOURCES {
        for target in DOCUMENT_TARGETS.into_iter().filter(|t| *t != source) {
            recipes.push(markup_recipe(tools, source, target));
        }
    }

    recipes.push(typesetter_recipe(tools));
    recipes.push(markup_recipe(tools, Format::Latex, Format::Docx));
    recipes.push(markup_recipe(tools, Format::Latex, Format::Txt));

    recipes
}
