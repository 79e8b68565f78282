use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::gallery::gallery_files;
use facematch_core::imaging;
use facematch_core::{
    load_known_faces, recognize_faces, Annotator, Config, CosineMatcher, FaceAnalyzer, FaceMatch,
    OnnxAnalyzer, Recognition,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facematch", about = "Recognize faces against a folder of known faces", version)]
struct Cli {
    /// Config file (default: $FACEMATCH_CONFIG or ./facematch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Folder of known faces, one image per person
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,

    /// Folder holding the ONNX models
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every face in an image with the closest known face
    Recognize {
        image: PathBuf,
        /// Annotated output image (default: <IMAGE stem>_annotated.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the recognition as JSON instead of status lines
        #[arg(long)]
        json: bool,
        /// Label faces below this cosine similarity as "Unknown"
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Load the gallery and list its identities
    Gallery,
    /// List the faces detected in an image
    Detect { image: PathBuf },
    /// Cosine similarity between the first faces of two images
    Compare { first: PathBuf, second: PathBuf },
    /// Show the resolved configuration and model files
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(gallery) = cli.gallery {
        config.gallery_dir = gallery;
    }
    if let Some(models) = cli.models {
        config.model_dir = models;
    }

    match cli.command {
        Commands::Recognize {
            image,
            output,
            json,
            min_similarity,
        } => {
            if let Some(min) = min_similarity {
                config.matching.min_similarity = Some(min);
            }
            let output = output.unwrap_or_else(|| default_output_path(&image));
            let mut analyzer = load_analyzer(&config)?;
            let annotator = Annotator::new(&config.annotate)?;
            recognize(&mut analyzer, &annotator, &config, &image, &output, json)
        }
        Commands::Gallery => gallery(&mut load_analyzer(&config)?, &config),
        Commands::Detect { image } => detect(&mut load_analyzer(&config)?, &image),
        Commands::Compare { first, second } => {
            compare(&mut load_analyzer(&config)?, &config, &first, &second)
        }
        Commands::Status => {
            status(&config);
            Ok(())
        }
    }
}

fn load_analyzer(config: &Config) -> Result<OnnxAnalyzer> {
    OnnxAnalyzer::from_config(config).with_context(|| {
        format!(
            "failed to load face models from {} (run `facematch status`)",
            config.model_dir.display()
        )
    })
}

fn open_image(path: &Path) -> Result<image::RgbImage> {
    imaging::open_rgb(path).with_context(|| format!("cannot open {}", path.display()))
}

/// `photos/group.jpg` → `photos/group_annotated.png`.
fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    image.with_file_name(format!("{stem}_annotated.png"))
}

fn face_lines(face: &FaceMatch) -> Vec<String> {
    let mut lines: Vec<String> = face
        .scores
        .iter()
        .map(|s| format!("→ similarity with {}: {:.2}", s.name, s.similarity))
        .collect();
    lines.push(face.result.caption());
    lines
}

/// "Faces detected" with the raw detector count, then each labelled face.
fn recognition_lines(recognition: &Recognition) -> Vec<String> {
    let mut lines = vec![format!("Faces detected: {}", recognition.detected)];
    for (i, face) in recognition.faces.iter().enumerate() {
        lines.push(format!("Face {}:", i + 1));
        lines.extend(face_lines(face).into_iter().map(|line| format!("  {line}")));
    }
    lines
}

fn recognize<A>(
    analyzer: &mut A,
    annotator: &Annotator,
    config: &Config,
    image_path: &Path,
    output: &Path,
    json: bool,
) -> Result<()>
where
    A: FaceAnalyzer + ?Sized,
{
    if !json {
        println!("Loading known faces...");
    }
    let load = load_known_faces(&config.gallery_dir, analyzer)?;
    for skipped in &load.skipped {
        eprintln!("warning: {skipped}");
    }
    if load.gallery.is_empty() {
        bail!(
            "no known faces loaded from {}; add one JPEG or PNG per person",
            config.gallery_dir.display()
        );
    }
    if !json {
        println!("{} known faces loaded", load.gallery.len());
    }

    let mut image = open_image(image_path)?;
    let matcher = CosineMatcher::new(config.matching.min_similarity);
    let recognition = recognize_faces(analyzer, &matcher, &load.gallery, &image)?;

    annotator.annotate(&mut image, &recognition.faces);
    image
        .save(output)
        .with_context(|| format!("cannot write {}", output.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recognition)?);
        return Ok(());
    }

    for line in recognition_lines(&recognition) {
        println!("{line}");
    }
    println!("Annotated image written to {}", output.display());
    Ok(())
}

fn gallery<A: FaceAnalyzer + ?Sized>(analyzer: &mut A, config: &Config) -> Result<()> {
    let load = load_known_faces(&config.gallery_dir, analyzer)?;

    println!("Gallery: {}", config.gallery_dir.display());
    if load.gallery.is_empty() {
        println!("  No known faces");
    }
    for identity in load.gallery.identities() {
        println!("  {:<20} {}", identity.name, identity.source.display());
    }
    for skipped in &load.skipped {
        println!("  skipped: {skipped}");
    }
    Ok(())
}

fn detect<A: FaceAnalyzer + ?Sized>(analyzer: &mut A, image_path: &Path) -> Result<()> {
    let image = open_image(image_path)?;
    let faces = analyzer.detect(&image)?;

    println!("Faces detected: {}", faces.len());
    for (i, face) in faces.iter().enumerate() {
        println!(
            "  {}: x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}{}",
            i + 1,
            face.x,
            face.y,
            face.width,
            face.height,
            face.confidence,
            if face.landmarks.is_some() { " (landmarks)" } else { "" }
        );
    }
    Ok(())
}

fn compare<A>(analyzer: &mut A, config: &Config, first: &Path, second: &Path) -> Result<()>
where
    A: FaceAnalyzer + ?Sized,
{
    let mut embed_first_face = |path: &Path| -> Result<facematch_core::Embedding> {
        let image = open_image(path)?;
        let faces = analyzer.detect(&image)?;
        let Some(face) = faces.first() else {
            bail!("no face detected in {}", path.display());
        };
        Ok(analyzer.embed(&image, face)?)
    };

    let a = embed_first_face(first)?;
    let b = embed_first_face(second)?;
    let similarity = a.similarity(&b);
    println!("Similarity: {similarity:.4}");
    if let Some(min) = config.matching.min_similarity {
        let verdict = if similarity >= min { "same person" } else { "different people" };
        println!("Threshold {min:.2}: {verdict}");
    }
    Ok(())
}

fn status(config: &Config) {
    let exists = |p: &Path| if p.exists() { "found" } else { "MISSING" };

    println!("facematch {}", env!("CARGO_PKG_VERSION"));
    println!("  Gallery:      {}", config.gallery_dir.display());
    match gallery_files(&config.gallery_dir) {
        Ok(files) => println!("                {} candidate images", files.len()),
        Err(e) => println!("                {e}"),
    }
    let detector = config.detector_model_path();
    let recognizer = config.recognizer_model_path();
    println!("  Detector:     {} ({})", detector.display(), exists(&detector));
    println!("  Recognizer:   {} ({})", recognizer.display(), exists(&recognizer));
    println!("  Crop mode:    {:?}", config.matching.crop_mode);
    match config.matching.min_similarity {
        Some(min) => println!("  Threshold:    {min:.2}"),
        None => println!("  Threshold:    none (always nearest identity)"),
    }
    match &config.annotate.font_path {
        Some(font) => println!("  Font:         {}", font.display()),
        None => println!("  Font:         system default"),
    }
}
