//! FFI bindings for the native RGB-D driver shim
//!
//! The shim (`librgbd_shim`) wraps the vendor driver and delivers each
//! completed frame through a C callback on the driver's stream thread.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use crate::{CameraError, ColorCallback, ColorImage, DepthCallback, DepthCamera, DepthImage};
use tracing::{info, warn};

/// Opaque device handle
#[repr(C)]
pub struct RgbdDevice {
    _private: [u8; 0],
}

/// Color frame callback: RGB24 bytes
type CColorFn = unsafe extern "C" fn(
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    user: *mut c_void,
);

/// Depth frame callback: raw 16-bit samples
type CDepthFn = unsafe extern "C" fn(
    data: *const u16,
    samples: usize,
    width: u32,
    height: u32,
    user: *mut c_void,
);

#[link(name = "rgbd_shim")]
extern "C" {
    fn rgbd_device_count() -> i32;
    fn rgbd_open(index: u32) -> *mut RgbdDevice;
    fn rgbd_close(device: *mut RgbdDevice);
    fn rgbd_product_name(device: *const RgbdDevice) -> *const c_char;
    fn rgbd_serial_number(device: *const RgbdDevice) -> *const c_char;
    fn rgbd_set_color_callback(device: *mut RgbdDevice, cb: Option<CColorFn>, user: *mut c_void);
    fn rgbd_set_depth_callback(device: *mut RgbdDevice, cb: Option<CDepthFn>, user: *mut c_void);
    fn rgbd_set_depth_registration(device: *mut RgbdDevice, enabled: i32) -> i32;
    fn rgbd_start(device: *mut RgbdDevice) -> i32;
    fn rgbd_stop(device: *mut RgbdDevice);
    fn rgbd_is_streaming(device: *const RgbdDevice) -> i32;
    fn rgbd_color_fps(device: *const RgbdDevice) -> u32;
    fn rgbd_depth_fps(device: *const RgbdDevice) -> u32;
    fn rgbd_sync_supported(device: *const RgbdDevice) -> i32;
    fn rgbd_is_synchronized(device: *const RgbdDevice) -> i32;
    fn rgbd_set_synchronization(device: *mut RgbdDevice, enabled: i32) -> i32;
    fn rgbd_last_error() -> *const c_char;
}

fn last_error() -> String {
    // SAFETY: the shim returns a static NUL-terminated string or null
    unsafe {
        let ptr = rgbd_last_error();
        if ptr.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: checked non-null; owned by the device for its lifetime
    unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
}

unsafe extern "C" fn color_trampoline(
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    user: *mut c_void,
) {
    if data.is_null() || user.is_null() {
        return;
    }
    let callback = &mut *(user as *mut ColorCallback);
    let data = std::slice::from_raw_parts(data, len);
    callback(ColorImage::rgb(data, width, height));
}

unsafe extern "C" fn depth_trampoline(
    data: *const u16,
    samples: usize,
    width: u32,
    height: u32,
    user: *mut c_void,
) {
    if data.is_null() || user.is_null() {
        return;
    }
    let callback = &mut *(user as *mut DepthCallback);
    let samples = std::slice::from_raw_parts(data, samples);
    callback(DepthImage::new(samples, width, height));
}

/// Depth camera driven by the native shim
pub struct NativeCamera {
    device: *mut RgbdDevice,
    // Boxed twice so the pointer handed to C stays put
    color: Option<Box<ColorCallback>>,
    depth: Option<Box<DepthCallback>>,
}

impl NativeCamera {
    /// Number of devices currently attached
    pub fn device_count() -> usize {
        // SAFETY: no preconditions
        unsafe { rgbd_device_count() }.max(0) as usize
    }

    /// Open the device at `index` (zero-based)
    pub fn open(index: u32) -> Result<Self, CameraError> {
        // SAFETY: the shim returns null on failure
        let device = unsafe { rgbd_open(index) };
        if device.is_null() {
            return Err(CameraError::Open(last_error()));
        }

        // Align depth pixels to the color viewpoint
        // SAFETY: device is a live handle
        if unsafe { rgbd_set_depth_registration(device, 1) } != 0 {
            warn!("Depth registration unavailable: {}", last_error());
        }

        let camera = Self {
            device,
            color: None,
            depth: None,
        };
        info!("Native device {} serial '{}'", index, camera.serial_number());
        Ok(camera)
    }

    pub fn serial_number(&self) -> String {
        // SAFETY: device is a live handle
        c_string(unsafe { rgbd_serial_number(self.device) })
    }
}

impl DepthCamera for NativeCamera {
    fn description(&self) -> String {
        // SAFETY: device is a live handle
        c_string(unsafe { rgbd_product_name(self.device) })
    }

    fn register_color_callback(&mut self, callback: ColorCallback) {
        let mut boxed = Box::new(callback);
        let user = &mut *boxed as *mut ColorCallback as *mut c_void;
        // SAFETY: `boxed` is stored in self and outlives the registration;
        // it is unregistered in Drop before being freed.
        unsafe { rgbd_set_color_callback(self.device, Some(color_trampoline), user) };
        self.color = Some(boxed);
    }

    fn register_depth_callback(&mut self, callback: DepthCallback) {
        let mut boxed = Box::new(callback);
        let user = &mut *boxed as *mut DepthCallback as *mut c_void;
        // SAFETY: as for the color callback
        unsafe { rgbd_set_depth_callback(self.device, Some(depth_trampoline), user) };
        self.depth = Some(boxed);
    }

    fn start_streams(&mut self) -> Result<(), CameraError> {
        if self.color.is_none() {
            return Err(CameraError::MissingCallback("color"));
        }
        if self.depth.is_none() {
            return Err(CameraError::MissingCallback("depth"));
        }
        // SAFETY: device is a live handle
        let ret = unsafe { rgbd_start(self.device) };
        if ret != 0 {
            return Err(CameraError::Stream(format!("Start failed: {}", last_error())));
        }
        Ok(())
    }

    fn stop_streams(&mut self) {
        // SAFETY: the shim joins its stream threads before returning
        unsafe { rgbd_stop(self.device) }
    }

    fn is_streaming(&self) -> bool {
        unsafe { rgbd_is_streaming(self.device) == 1 }
    }

    fn color_fps(&self) -> u32 {
        unsafe { rgbd_color_fps(self.device) }
    }

    fn depth_fps(&self) -> u32 {
        unsafe { rgbd_depth_fps(self.device) }
    }

    fn is_synchronization_supported(&self) -> bool {
        unsafe { rgbd_sync_supported(self.device) == 1 }
    }

    fn is_synchronized(&self) -> bool {
        unsafe { rgbd_is_synchronized(self.device) == 1 }
    }

    fn set_synchronization(&mut self, enabled: bool) -> Result<(), CameraError> {
        let ret = unsafe { rgbd_set_synchronization(self.device, i32::from(enabled)) };
        if ret != 0 {
            return Err(CameraError::Stream(last_error()));
        }
        Ok(())
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        // SAFETY: streams are stopped and callbacks cleared before the
        // boxed closures are freed
        unsafe {
            rgbd_stop(self.device);
            rgbd_set_color_callback(self.device, None, std::ptr::null_mut());
            rgbd_set_depth_callback(self.device, None, std::ptr::null_mut());
            rgbd_close(self.device);
        }
    }
}

// SAFETY: the handle is only used through &mut self or read-only queries
// the shim documents as thread-safe.
unsafe impl Send for NativeCamera {}
