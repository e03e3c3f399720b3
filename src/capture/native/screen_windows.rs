//! Windows display capture using GDI BitBlt

use crate::capture::source::VideoFrame;
use crate::capture::traits::{CaptureError, CaptureResult, DisplayInfo};
use std::mem::zeroed;
use windows::{
    Win32::Foundation::{BOOL, HWND, LPARAM, RECT},
    Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
        EnumDisplayMonitors, GetDC, GetDIBits, GetMonitorInfoW, ReleaseDC, SelectObject,
        BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HDC, HMONITOR, MONITORINFOEXW,
        SRCCOPY,
    },
    Win32::UI::WindowsAndMessaging::GetDesktopWindow,
};

/// MONITORINFOF_PRIMARY
const PRIMARY_FLAG: u32 = 1;

struct Monitor {
    info: DisplayInfo,
    origin: (i32, i32),
}

fn enumerate_monitors() -> Vec<Monitor> {
    let mut monitors: Vec<Monitor> = Vec::new();
    let monitors_ptr = &mut monitors as *mut Vec<Monitor>;

    unsafe extern "system" fn enum_monitors_callback(
        hmonitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let monitors = &mut *(lparam.0 as *mut Vec<Monitor>);

        let mut monitor_info: MONITORINFOEXW = unsafe { zeroed() };
        monitor_info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

        if unsafe { GetMonitorInfoW(hmonitor, &mut monitor_info.monitorInfo) }.as_bool() {
            let rect = monitor_info.monitorInfo.rcMonitor;
            let is_primary = (monitor_info.monitorInfo.dwFlags & PRIMARY_FLAG) != 0;

            let name_len = monitor_info
                .szDevice
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(monitor_info.szDevice.len());
            let device = String::from_utf16_lossy(&monitor_info.szDevice[..name_len]);

            monitors.push(Monitor {
                info: DisplayInfo {
                    id: monitors.len() as u32,
                    name: if is_primary {
                        "Primary Display".to_string()
                    } else {
                        device
                    },
                    width: (rect.right - rect.left) as u32,
                    height: (rect.bottom - rect.top) as u32,
                    is_primary,
                },
                origin: (rect.left, rect.top),
            });
        }

        BOOL::from(true)
    }

    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_monitors_callback),
            LPARAM(monitors_ptr as isize),
        );
    }

    monitors
}

pub fn list_displays() -> Vec<DisplayInfo> {
    enumerate_monitors().into_iter().map(|m| m.info).collect()
}

/// GDI needs no capture permission
pub fn ensure_permission() -> CaptureResult<()> {
    Ok(())
}

/// Copies one monitor's area of the virtual desktop per grab
pub struct DisplayGrabber {
    origin: (i32, i32),
    width: u32,
    height: u32,
}

impl DisplayGrabber {
    pub fn open(display: &DisplayInfo) -> CaptureResult<Self> {
        let monitor = enumerate_monitors()
            .into_iter()
            .find(|m| m.info.id == display.id)
            .ok_or_else(|| CaptureError::NoSourceFound(format!("Display {} not found", display.id)))?;

        Ok(Self {
            origin: monitor.origin,
            width: monitor.info.width,
            height: monitor.info.height,
        })
    }

    pub fn grab(&mut self) -> Option<VideoFrame> {
        let (width, height) = (self.width, self.height);

        unsafe {
            let hwnd = GetDesktopWindow();
            let hdc_screen = GetDC(hwnd);
            if hdc_screen.is_invalid() {
                return None;
            }

            let hdc_mem = CreateCompatibleDC(hdc_screen);
            if hdc_mem.is_invalid() {
                release_screen_dc(hwnd, hdc_screen);
                return None;
            }

            let hbitmap = CreateCompatibleBitmap(hdc_screen, width as i32, height as i32);
            if hbitmap.is_invalid() {
                let _ = DeleteDC(hdc_mem);
                release_screen_dc(hwnd, hdc_screen);
                return None;
            }

            let old_bitmap = SelectObject(hdc_mem, hbitmap);

            let copied = BitBlt(
                hdc_mem,
                0,
                0,
                width as i32,
                height as i32,
                hdc_screen,
                self.origin.0,
                self.origin.1,
                SRCCOPY,
            );

            let mut buffer = vec![0u8; (width * height * 4) as usize];
            let mut lines = 0;
            if copied.is_ok() {
                let mut bmi: BITMAPINFO = zeroed();
                bmi.bmiHeader.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
                bmi.bmiHeader.biWidth = width as i32;
                // Negative height for a top-down bitmap
                bmi.bmiHeader.biHeight = -(height as i32);
                bmi.bmiHeader.biPlanes = 1;
                bmi.bmiHeader.biBitCount = 32;
                bmi.bmiHeader.biCompression = BI_RGB.0;

                lines = GetDIBits(
                    hdc_mem,
                    hbitmap,
                    0,
                    height,
                    Some(buffer.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );
            }

            SelectObject(hdc_mem, old_bitmap);
            let _ = DeleteObject(hbitmap);
            let _ = DeleteDC(hdc_mem);
            release_screen_dc(hwnd, hdc_screen);

            if lines == 0 {
                return None;
            }
            VideoFrame::from_bgra(width, height, width as usize * 4, &buffer)
        }
    }
}

unsafe fn release_screen_dc(hwnd: HWND, hdc: HDC) {
    ReleaseDC(hwnd, hdc);
}
