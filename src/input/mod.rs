/// 视频输入系统 (Frame Input)
///
/// - frame:      编码帧解码与尺寸校验
/// - preprocess: 检测前的图像增强 (对比度/去噪/锐化)
pub mod frame;
pub mod preprocess;

pub use frame::{decode_frame, validate_frame};
pub use preprocess::preprocess;
