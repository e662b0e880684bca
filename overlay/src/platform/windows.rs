//! Windows implementation of the overlay window pair
//!
//! A hidden tool-window owner keeps the overlay out of Alt+Tab; the overlay
//! itself is a borderless popup with no redirection bitmap, so its only
//! visible content is the DirectComposition visual bound to it.

use std::mem;

use windows::Win32::Foundation::{COLORREF, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Dwm::DwmExtendFrameIntoClientArea;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Controls::MARGINS;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, SetActiveWindow, SetFocus,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CS_HREDRAW, CS_VREDRAW, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
    GWL_EXSTYLE, GetClientRect, GetSystemMetrics, GetWindowLongPtrW, HTCLIENT, HWND_TOPMOST,
    IDC_ARROW, LWA_ALPHA, LoadCursorW, MSG, PM_REMOVE, PeekMessageW, PostMessageW,
    PostQuitMessage, RegisterClassExW, SM_CXSCREEN, SM_CYSCREEN, SW_SHOWNOACTIVATE,
    SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER,
    SetForegroundWindow, SetLayeredWindowAttributes, SetWindowLongPtrW, SetWindowPos, ShowWindow,
    TranslateMessage, WINDOW_EX_STYLE, WM_ACTIVATE, WM_CLOSE, WM_ENDSESSION, WM_ERASEBKGND,
    WM_NCHITTEST, WM_QUIT, WM_SIZE, WNDCLASSEXW, WS_EX_APPWINDOW, WS_EX_LAYERED,
    WS_EX_NOACTIVATE, WS_EX_NOREDIRECTIONBITMAP, WS_EX_TOOLWINDOW, WS_EX_TOPMOST,
    WS_EX_TRANSPARENT, WS_POPUP,
};
use windows::core::PCWSTR;

use super::{RawHandle, WindowBackend, WindowSpec, ends_message_loop, ex_style};
use crate::error::OverlayError;
use crate::hotkey::VirtualKey;
use crate::input::{Modifiers, NativeMessage, msg};

const OVERLAY_CLASS: &str = "VeilOverlayClass";
const OWNER_CLASS: &str = "VeilOverlayOwnerClass";

const ERROR_CLASS_ALREADY_EXISTS: i32 = 1410;

const _: () = assert!(ex_style::TOPMOST == WS_EX_TOPMOST.0);
const _: () = assert!(ex_style::TRANSPARENT == WS_EX_TRANSPARENT.0);
const _: () = assert!(ex_style::TOOLWINDOW == WS_EX_TOOLWINDOW.0);
const _: () = assert!(ex_style::APPWINDOW == WS_EX_APPWINDOW.0);
const _: () = assert!(ex_style::LAYERED == WS_EX_LAYERED.0);
const _: () = assert!(ex_style::NOREDIRECTIONBITMAP == WS_EX_NOREDIRECTIONBITMAP.0);
const _: () = assert!(ex_style::NOACTIVATE == WS_EX_NOACTIVATE.0);
const _: () = assert!(msg::WM_CLOSE == WM_CLOSE);
const _: () = assert!(msg::WM_ENDSESSION == WM_ENDSESSION);

/// Size of the primary display in pixels.
pub fn primary_screen_size() -> (u32, u32) {
    let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
    (w.max(1) as u32, h.max(1) as u32)
}

/// Owner and overlay windows on the current thread.
///
/// Not `Send`: window handles belong to the thread whose message queue
/// created them.
pub struct Win32Window {
    owner: HWND,
    overlay: HWND,
    msg: MSG,
}

impl Win32Window {
    /// Overlay window handle for composition setup.
    pub fn hwnd(&self) -> HWND {
        self.overlay
    }

    fn register_class(
        name: &[u16],
        proc: unsafe extern "system" fn(HWND, u32, WPARAM, LPARAM) -> LRESULT,
    ) -> Result<(), OverlayError> {
        unsafe {
            let hinstance = GetModuleHandleW(None).map_err(OverlayError::win32("GetModuleHandleW"))?;

            let wc = WNDCLASSEXW {
                cbSize: mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(proc),
                hInstance: hinstance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                lpszClassName: PCWSTR(name.as_ptr()),
                ..Default::default()
            };

            if RegisterClassExW(&wc) == 0 {
                // Registered by an earlier overlay in this process
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(ERROR_CLASS_ALREADY_EXISTS) {
                    return Err(OverlayError::Platform {
                        call: "RegisterClassExW",
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl WindowBackend for Win32Window {
    fn create(spec: &WindowSpec, ex_style: u32) -> Result<Self, OverlayError> {
        let owner_class = wide_string(OWNER_CLASS);
        let overlay_class = wide_string(OVERLAY_CLASS);
        Self::register_class(&owner_class, owner_proc)?;
        Self::register_class(&overlay_class, window_proc)?;

        let title = wide_string(&spec.title);
        unsafe {
            let hinstance = GetModuleHandleW(None).map_err(OverlayError::win32("GetModuleHandleW"))?;

            let owner = CreateWindowExW(
                WS_EX_TOOLWINDOW,
                PCWSTR(owner_class.as_ptr()),
                PCWSTR(title.as_ptr()),
                WS_POPUP,
                0,
                0,
                0,
                0,
                None,
                None,
                hinstance,
                None,
            )
            .map_err(OverlayError::win32("CreateWindowExW(owner)"))?;

            let parent = if spec.hide_from_alt_tab {
                owner
            } else {
                HWND::default()
            };

            let overlay = match CreateWindowExW(
                WINDOW_EX_STYLE(ex_style),
                PCWSTR(overlay_class.as_ptr()),
                PCWSTR(title.as_ptr()),
                WS_POPUP,
                0,
                0,
                spec.width as i32,
                spec.height as i32,
                parent,
                None,
                hinstance,
                None,
            ) {
                Ok(hwnd) => hwnd,
                Err(e) => {
                    let _ = DestroyWindow(owner);
                    return Err(OverlayError::win32("CreateWindowExW(overlay)")(e));
                }
            };

            tracing::debug!(
                owner = ?owner,
                overlay = ?overlay,
                ex_style = format_args!("{:#x}", ex_style),
                "created native windows"
            );

            Ok(Self {
                owner,
                overlay,
                msg: MSG::default(),
            })
        }
    }

    fn owner_handle(&self) -> RawHandle {
        self.owner.0 as RawHandle
    }

    fn overlay_handle(&self) -> RawHandle {
        self.overlay.0 as RawHandle
    }

    fn ex_style(&self) -> u32 {
        unsafe { GetWindowLongPtrW(self.overlay, GWL_EXSTYLE) as u32 }
    }

    fn set_ex_style(&mut self, style: u32) {
        unsafe {
            SetWindowLongPtrW(self.overlay, GWL_EXSTYLE, style as isize);
            // Style changes only take effect after a frame refresh
            if let Err(e) = SetWindowPos(
                self.overlay,
                None,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE | SWP_FRAMECHANGED,
            ) {
                tracing::warn!(error = %e, "SetWindowPos after style change failed");
            }
        }
    }

    fn apply_transparency(&mut self) -> Result<(), OverlayError> {
        unsafe {
            SetLayeredWindowAttributes(self.overlay, COLORREF(0), 255, LWA_ALPHA)
                .map_err(OverlayError::win32("SetLayeredWindowAttributes"))?;
            let margins = MARGINS {
                cxLeftWidth: -1,
                cxRightWidth: -1,
                cyTopHeight: -1,
                cyBottomHeight: -1,
            };
            DwmExtendFrameIntoClientArea(self.overlay, &margins)
                .map_err(OverlayError::win32("DwmExtendFrameIntoClientArea"))?;
        }
        Ok(())
    }

    fn show_no_activate(&mut self) {
        unsafe {
            let _ = ShowWindow(self.overlay, SW_SHOWNOACTIVATE);
        }
    }

    fn set_topmost(&mut self) {
        unsafe {
            if let Err(e) = SetWindowPos(
                self.overlay,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            ) {
                tracing::warn!(error = %e, "failed to re-assert topmost");
            }
        }
    }

    fn activate(&mut self) {
        unsafe {
            let _ = SetForegroundWindow(self.overlay);
            let _ = SetActiveWindow(self.overlay);
            let _ = SetFocus(self.overlay);
        }
    }

    fn client_size(&self) -> (u32, u32) {
        let mut rect = RECT::default();
        unsafe {
            if GetClientRect(self.overlay, &mut rect).is_err() {
                return (0, 0);
            }
        }
        (
            (rect.right - rect.left).max(0) as u32,
            (rect.bottom - rect.top).max(0) as u32,
        )
    }

    fn drain_messages(&mut self, out: &mut Vec<NativeMessage>) {
        unsafe {
            // Null window: also picks up thread messages such as WM_QUIT
            while PeekMessageW(&mut self.msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let m = &self.msg;
                out.push(NativeMessage::new(m.message, m.wParam.0, m.lParam.0));
                if m.message == WM_QUIT {
                    continue;
                }
                let _ = TranslateMessage(m);
                DispatchMessageW(m);
            }
        }
    }

    fn is_key_down(&self, vk: VirtualKey) -> bool {
        unsafe { GetAsyncKeyState(vk as i32) < 0 }
    }

    fn modifiers(&self) -> Modifiers {
        Modifiers::sample(|vk| unsafe { GetKeyState(vk as i32) < 0 })
    }

    fn destroy(&mut self) {
        unsafe {
            if !self.overlay.is_invalid() {
                let _ = DestroyWindow(self.overlay);
                self.overlay = HWND::default();
            }
            if !self.owner.is_invalid() {
                let _ = DestroyWindow(self.owner);
                self.owner = HWND::default();
            }
        }
    }
}

impl Drop for Win32Window {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Window procedure for the overlay.
///
/// Size and activation changes arrive as sent messages, which never reach
/// the queue; they are re-posted as app messages so the frame loop sees them.
unsafe extern "system" fn window_proc(
    hwnd: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match message {
        WM_NCHITTEST => LRESULT(HTCLIENT as isize),
        WM_ERASEBKGND => LRESULT(1),
        WM_SIZE => {
            unsafe {
                let _ = PostMessageW(hwnd, msg::WM_APP_RESIZED, WPARAM(0), lparam);
            }
            LRESULT(0)
        }
        WM_ACTIVATE => {
            unsafe {
                let _ = PostMessageW(hwnd, msg::WM_APP_ACTIVATED, wparam, LPARAM(0));
                DefWindowProcW(hwnd, message, wparam, lparam)
            }
        }
        WM_CLOSE | WM_ENDSESSION => {
            // Teardown happens when the manager drops, not here
            if ends_message_loop(message, wparam.0) {
                unsafe { PostQuitMessage(0) };
            }
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(hwnd, message, wparam, lparam) },
    }
}

unsafe extern "system" fn owner_proc(
    hwnd: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match message {
        WM_CLOSE | WM_ENDSESSION => {
            if ends_message_loop(message, wparam.0) {
                unsafe { PostQuitMessage(0) };
            }
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(hwnd, message, wparam, lparam) },
    }
}

/// Convert a &str to a null-terminated wide string
fn wide_string(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
