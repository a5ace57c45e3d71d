/// Audio sample rate in Hz (16-bit mono PCM).
pub const AUDIO_SAMPLE_FREQUENCY: u32 = 16_000;

/// Time advance between two consecutive feature slices.
pub const FEATURE_STRIDE_MS: u32 = 20;

/// Length of audio each feature slice is computed from.
pub const FEATURE_DURATION_MS: u32 = 30;

/// Number of slices in the feature matrix fed to the classifier.
pub const FEATURE_COUNT: usize = 49;

/// Number of `i8` values in one feature slice.
pub const FEATURE_SIZE: usize = 40;

/// Total number of `i8` values in the feature matrix.
pub const FEATURE_ELEMENT_COUNT: usize = FEATURE_COUNT * FEATURE_SIZE;

/// Samples needed to compute one feature slice.
pub const MAX_AUDIO_SAMPLE_SIZE: usize =
    (FEATURE_DURATION_MS * (AUDIO_SAMPLE_FREQUENCY / 1000)) as usize;

/// Samples carried over between two windows.
pub const HISTORY_SAMPLES_TO_KEEP: usize =
    ((FEATURE_DURATION_MS - FEATURE_STRIDE_MS) * (AUDIO_SAMPLE_FREQUENCY / 1000)) as usize;

/// Fresh samples pulled from the capture buffer for every window.
pub const NEW_SAMPLES_TO_GET: usize =
    (FEATURE_STRIDE_MS * (AUDIO_SAMPLE_FREQUENCY / 1000)) as usize;

/// Capacity of the capture ring buffer in bytes.
pub const AUDIO_CAPTURE_BUFFER_SIZE: usize = 40_000;

/// Bytes requested from the I2S driver per read (100 ms of 16-bit audio).
pub const I2S_BYTES_TO_READ: usize = 3200;

/// Bounded wait for one I2S read.
pub const I2S_READ_TIMEOUT_MS: u32 = 100;

/// Bounded wait for appending a chunk to the capture buffer.
pub const CAPTURE_WRITE_TIMEOUT_MS: u32 = 100;

/// Bounded wait for pulling one stride of audio out of the capture buffer.
pub const WINDOW_READ_TIMEOUT_MS: u32 = 200;

/// Right shift applied to 32-bit I2S words to bring them to 16 bits.
pub const I2S_32BIT_RESCALE_SHIFT: u32 = 14;

/// Number of output categories of the keyword model.
pub const CATEGORY_COUNT: usize = 4;

/// Category labels in model output order.
pub const CATEGORY_LABELS: [&str; CATEGORY_COUNT] = ["silence", "unknown", "yes", "no"];

const _: () = {
    assert!(FEATURE_STRIDE_MS <= FEATURE_DURATION_MS);
    assert!(MAX_AUDIO_SAMPLE_SIZE == HISTORY_SAMPLES_TO_KEEP + NEW_SAMPLES_TO_GET);
    assert!(AUDIO_CAPTURE_BUFFER_SIZE >= 4 * I2S_BYTES_TO_READ);
    assert!(I2S_BYTES_TO_READ % 4 == 0);
};
