use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tilemap_core::{
    Map, NullTextureLoader, ReadOptions, SaveFormat, SaveFormatId, SaveFormatRegistry,
    TileCompression, TileFormat, WriteOptions,
};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Yaml,
    Tmj,
    Tmx,
}

impl From<FormatArg> for SaveFormatId {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Yaml => SaveFormatId::TactileYaml,
            FormatArg::Tmj => SaveFormatId::TiledJson,
            FormatArg::Tmx => SaveFormatId::TiledXml,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    Plain,
    Base64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Zlib,
    Zstd,
}

/// Converts a tile map between the Tactile YAML, Tiled JSON and Tiled XML formats.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Map file to read (.yaml, .yml, .tmj, .json, .tmx, .xml)
    input: PathBuf,
    /// Map file to write
    output: PathBuf,
    /// Output format, guessed from the output extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Write tilesets to files next to the map
    #[arg(long)]
    external_tilesets: bool,
    /// Fail on missing keys and missing tileset images
    #[arg(long)]
    strict: bool,
    /// Tile layer encoding of the written map
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,
    /// Tile layer compression of the written map (implies base64)
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tilemap_core=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn output_format(cli: &Cli, registry: &SaveFormatRegistry) -> Result<SaveFormatId> {
    if let Some(format) = cli.format {
        return Ok(format.into());
    }
    match registry.format_for_path(&cli.output) {
        Some(format) => Ok(format.id()),
        None => bail!(
            "cannot tell the format of {} from its extension, pass --format",
            cli.output.display()
        ),
    }
}

fn tile_format(cli: &Cli, current: TileFormat) -> Result<TileFormat> {
    let compression = match cli.compression {
        Some(CompressionArg::None) => Some(TileCompression::None),
        Some(CompressionArg::Zlib) => Some(TileCompression::Zlib),
        Some(CompressionArg::Zstd) => Some(TileCompression::Zstd),
        None => None,
    };
    let format = match (cli.encoding, compression) {
        (Some(EncodingArg::Plain), None | Some(TileCompression::None)) => TileFormat::plain(),
        (Some(EncodingArg::Plain), Some(_)) => bail!("plain text tile data cannot be compressed"),
        (Some(EncodingArg::Base64), compression) => {
            TileFormat::base64(compression.unwrap_or(TileCompression::None))
        }
        (None, Some(compression)) => TileFormat::base64(compression),
        (None, None) => current,
    };
    Ok(format)
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    let registry = SaveFormatRegistry::with_builtin_formats();

    let mut read_options = ReadOptions::for_file(&cli.input);
    read_options.strict_mode = cli.strict;
    let ir = registry
        .load_map(&cli.input, &read_options)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;

    let mut map = Map::from_ir(&ir, &mut NullTextureLoader)
        .with_context(|| format!("{} is not a valid map", cli.input.display()))?;
    let format = tile_format(&cli, map.tile_format)?;
    if format.encoding != map.tile_format.encoding || format.compression != map.tile_format.compression {
        info!(
            "tile layers: {}/{} -> {}/{}",
            map.tile_format.encoding, map.tile_format.compression, format.encoding, format.compression
        );
        map.tile_format = TileFormat {
            compression_level: None,
            ..format
        };
    }

    let id = output_format(&cli, &registry)?;
    let write_options = WriteOptions {
        use_external_tilesets: cli.external_tilesets,
        ..WriteOptions::for_file(&cli.output)
    };
    registry
        .save_map(id, &cli.output, &map.to_ir(), &write_options)
        .with_context(|| format!("failed to save {}", cli.output.display()))?;

    info!("wrote {} as {id}", cli.output.display());
    Ok(())
}
