// Re-export commonly used types for convenience
pub use crate::cli::{Cli, Command};
pub use crate::compose::{
    add_voice_to_video, concatenate_audio_files, concatenate_video_files, create_audio_file,
    create_still_video, create_video_file, AudioMixJob, ResizeBy, StillVideoJob, VideoJob,
};
pub use crate::config::{Language, Orientation, VariantPaths, WorkspaceConfig};
pub use crate::encoder::{EncodeSettings, FfmpegCommand};
pub use crate::font::{Font, FontLibrary, SizedFont, TextBox};
pub use crate::layout::{fit_text_to_region, measure_block, wrap_words, FitRequest, FitResult, LayoutError};
pub use crate::overlay::{
    create_image_with_overlays, parse_color, render_caption_plate, render_portrait_overlays,
    CaptionStyle, PortraitLayout, TextOverlay, TextStyle,
};
pub use crate::pipeline::{
    build_all_variants, build_variant, process_tracker, IntermediateFiles, VariantOptions,
};
pub use crate::probe::{probe_duration, probe_media, MediaInfo};
pub use crate::sheet::{load_overlay_entries, texts_from_column, Sheet, SheetRow, VideoOverlayEntry};
pub use crate::timing::{
    reconcile_bed, reconcile_segments, Adjustment, BedPlan, ReconcilePlan, Segment, TimingError,
    DURATION_EPSILON,
};
pub use crate::utils::*;
pub use crate::{ReelError, Result};
