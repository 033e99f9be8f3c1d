//! Tray-icon backend on top of the Win32 shell notification area.
//!
//! Every tile is one notification icon owned by a hidden window. A tile
//! update loads its pixels into a shared colour bitmap, builds an icon from
//! that bitmap and the shared mask, hands it to the shell and destroys it
//! again; the shell keeps its own copy.

use crate::display::backend::{PumpOutcome, TrayBackend};
use crate::input::{deliver_raw_key, KeyQueue, KeySource};
use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOL, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    CreateBitmap, CreateCompatibleBitmap, DeleteObject, GetDC, ReleaseDC, SetDIBits, BITMAPINFO,
    BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HDC,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIM_ADD, NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    NOTIFY_ICON_MESSAGE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateIconIndirect, CreateWindowExW, DefWindowProcW, DestroyIcon, DestroyWindow,
    DispatchMessageW, PeekMessageW, RegisterClassExW, SetWindowTextW, TranslateMessage,
    UnregisterClassW, HICON, ICONINFO, MSG, PM_REMOVE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE,
    WM_DESTROY, WM_KEYDOWN, WM_KEYUP, WNDCLASSEXW,
};

struct WindowDispatch {
    keys: Arc<KeyQueue>,
    destroyed: AtomicBool,
}

static WINDOWS: Lazy<Mutex<HashMap<isize, Arc<WindowDispatch>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn dispatch_for(hwnd: HWND) -> Option<Arc<WindowDispatch>> {
    WINDOWS
        .lock()
        .ok()
        .and_then(|windows| windows.get(&(hwnd.0 as isize)).cloned())
}

fn widestring(value: &str) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    std::ffi::OsStr::new(value)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

unsafe extern "system" fn tray_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_CLOSE => {
            let _ = unsafe { DestroyWindow(hwnd) };
            LRESULT(0)
        }
        WM_DESTROY => {
            if let Some(dispatch) = dispatch_for(hwnd) {
                dispatch.destroyed.store(true, Ordering::Release);
            }
            LRESULT(0)
        }
        WM_KEYDOWN | WM_KEYUP => {
            if let Some(dispatch) = dispatch_for(hwnd) {
                deliver_raw_key(
                    &dispatch.keys,
                    KeySource::Window,
                    msg == WM_KEYDOWN,
                    wparam.0 as u32,
                );
            }
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

struct Surface {
    hwnd: HWND,
    hdc: HDC,
    hinstance: HINSTANCE,
    class_name: Vec<u16>,
    dispatch: Arc<WindowDispatch>,
}

struct TileBitmap {
    icon_info: ICONINFO,
    bmi: BITMAPINFO,
    side: usize,
}

#[derive(Default)]
pub struct Win32TrayBackend {
    surface: Option<Surface>,
    bitmap: Option<TileBitmap>,
}

impl Win32TrayBackend {
    fn surface(&self) -> Result<&Surface> {
        self.surface
            .as_ref()
            .ok_or_else(|| anyhow!("no drawable surface"))
    }

    fn notify(&self, message: NOTIFY_ICON_MESSAGE, slot: u32, icon: HICON) -> Result<()> {
        let surface = self.surface()?;
        let nid = NOTIFYICONDATAW {
            cbSize: mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: surface.hwnd,
            uID: slot,
            uFlags: NIF_ICON,
            hIcon: icon,
            ..Default::default()
        };
        if unsafe { Shell_NotifyIconW(message, &nid) }.as_bool() {
            Ok(())
        } else {
            Err(anyhow!("Shell_NotifyIconW({}) failed for slot {slot}", message.0))
        }
    }
}

impl TrayBackend for Win32TrayBackend {
    fn create_surface(&mut self, class_name: &str, title: &str, keys: Arc<KeyQueue>) -> Result<()> {
        if self.surface.is_some() {
            return Ok(());
        }

        let hinstance: HINSTANCE = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .context("resolve module handle")?
            .into();
        let class_name = widestring(class_name);
        let wide_title = widestring(title);

        let wc = WNDCLASSEXW {
            cbSize: mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(tray_wndproc),
            hInstance: hinstance,
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        if unsafe { RegisterClassExW(&wc) } == 0 {
            bail!("window registration failed: {}", windows::core::Error::from_win32());
        }

        let hwnd = match unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                PCWSTR(class_name.as_ptr()),
                PCWSTR(wide_title.as_ptr()),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                None,
                None,
                hinstance,
                None,
            )
        } {
            Ok(hwnd) if !hwnd.0.is_null() => hwnd,
            result => {
                unsafe {
                    let _ = UnregisterClassW(PCWSTR(class_name.as_ptr()), hinstance);
                }
                let err = result.err().unwrap_or_else(windows::core::Error::from_win32);
                bail!("window creation failed: {err}");
            }
        };

        let dispatch = Arc::new(WindowDispatch {
            keys,
            destroyed: AtomicBool::new(false),
        });
        if let Ok(mut windows) = WINDOWS.lock() {
            windows.insert(hwnd.0 as isize, Arc::clone(&dispatch));
        }

        let hdc = unsafe { GetDC(hwnd) };
        tracing::info!(title, "tray surface created");
        self.surface = Some(Surface {
            hwnd,
            hdc,
            hinstance,
            class_name,
            dispatch,
        });
        Ok(())
    }

    fn destroy_surface(&mut self) {
        let Some(surface) = self.surface.take() else {
            return;
        };

        unsafe {
            let _ = ReleaseDC(surface.hwnd, surface.hdc);
            if !surface.dispatch.destroyed.load(Ordering::Acquire) {
                let _ = DestroyWindow(surface.hwnd);
            }
            let _ = UnregisterClassW(PCWSTR(surface.class_name.as_ptr()), surface.hinstance);
        }
        if let Ok(mut windows) = WINDOWS.lock() {
            windows.remove(&(surface.hwnd.0 as isize));
        }
        tracing::info!("tray surface destroyed");
    }

    fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        let surface = self.surface()?;
        let wide = widestring(title);
        unsafe { SetWindowTextW(surface.hwnd, PCWSTR(wide.as_ptr())) }.context("set window title")
    }

    fn pump_events(&mut self) -> PumpOutcome {
        let mut outcome = PumpOutcome::default();
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
                outcome.dispatched += 1;
            }
        }
        outcome.destroy_requested = self
            .surface
            .as_ref()
            .map(|surface| surface.dispatch.destroyed.load(Ordering::Acquire))
            .unwrap_or(false);
        outcome
    }

    fn create_tile_bitmap(&mut self, tile_side: usize) -> Result<()> {
        if self.bitmap.is_some() {
            return Ok(());
        }
        let hdc = self.surface()?.hdc;
        let side = i32::try_from(tile_side).context("tile side out of range")?;

        let hbm_mask = unsafe { CreateBitmap(side, side, 1, 1, None) };
        if hbm_mask.is_invalid() {
            bail!("create {side}x{side} icon mask bitmap");
        }
        let hbm_color = unsafe { CreateCompatibleBitmap(hdc, side, side) };
        if hbm_color.is_invalid() {
            unsafe {
                let _ = DeleteObject(hbm_mask);
            }
            bail!("create {side}x{side} icon colour bitmap");
        }

        let mut bmi = BITMAPINFO::default();
        bmi.bmiHeader = BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: side,
            biHeight: -side,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        };

        let blank = vec![0u32; tile_side * tile_side];
        unsafe {
            SetDIBits(
                hdc,
                hbm_color,
                0,
                side as u32,
                blank.as_ptr().cast(),
                &bmi,
                DIB_RGB_COLORS,
            );
        }

        self.bitmap = Some(TileBitmap {
            icon_info: ICONINFO {
                fIcon: BOOL(1),
                xHotspot: 0,
                yHotspot: 0,
                hbmMask: hbm_mask,
                hbmColor: hbm_color,
            },
            bmi,
            side: tile_side,
        });
        Ok(())
    }

    fn release_tile_bitmap(&mut self) {
        if let Some(bitmap) = self.bitmap.take() {
            unsafe {
                let _ = DeleteObject(bitmap.icon_info.hbmMask);
                let _ = DeleteObject(bitmap.icon_info.hbmColor);
            }
        }
    }

    fn add_slot(&mut self, slot: u32) -> Result<()> {
        self.notify(NIM_ADD, slot, HICON::default())
    }

    fn remove_slot(&mut self, slot: u32) -> Result<()> {
        self.notify(NIM_DELETE, slot, HICON::default())
    }

    fn present_tile(&mut self, slot: u32, pixels: &[u32]) -> Result<()> {
        let hdc = self.surface()?.hdc;
        let bitmap = self
            .bitmap
            .as_ref()
            .ok_or_else(|| anyhow!("no tile bitmap"))?;
        if pixels.len() < bitmap.side * bitmap.side {
            bail!("tile has {} pixels, bitmap holds {}", pixels.len(), bitmap.side * bitmap.side);
        }

        let icon = unsafe {
            SetDIBits(
                hdc,
                bitmap.icon_info.hbmColor,
                0,
                bitmap.side as u32,
                pixels.as_ptr().cast(),
                &bitmap.bmi,
                DIB_RGB_COLORS,
            );
            CreateIconIndirect(&bitmap.icon_info).context("build tile icon")?
        };

        let shown = self.notify(NIM_MODIFY, slot, icon);
        unsafe {
            let _ = DestroyIcon(icon);
        }
        shown
    }
}

impl Drop for Win32TrayBackend {
    fn drop(&mut self) {
        self.release_tile_bitmap();
        self.destroy_surface();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widestring_is_nul_terminated() {
        assert_eq!(widestring("Doom"), vec![68, 111, 111, 109, 0]);
    }

    #[test]
    fn slot_calls_without_surface_fail() {
        let mut backend = Win32TrayBackend::default();
        assert!(backend.add_slot(0).is_err());
        assert!(backend.present_tile(0, &[]).is_err());
        assert!(!backend.pump_events().destroy_requested);
    }
}
