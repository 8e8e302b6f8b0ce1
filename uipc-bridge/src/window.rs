//! Win32 host window and message loop.
//!
//! Local clients find the bridge by its window class and talk to it with
//! `WM_COPYDATA` or the registered `FSASMLIB:IPC` message. The window
//! procedure owns the [`BridgeHost`] and answers each message with the
//! host's handled / not-handled result.
//!
//! [`BridgeHost`]: crate::host::BridgeHost

/// Window class and title clients look for.
pub const WINDOW_CLASS: &str = "UIPCMAIN";
/// Registered message carrying a region request (`wParam` atom, `lParam` offset).
pub const IPC_MESSAGE: &str = "FSASMLIB:IPC";
/// Registered message older clients use to probe for the server.
pub const FS6_MESSAGE: &str = "FS6IPC";

#[cfg(target_os = "windows")]
mod platform {
    use std::cell::RefCell;
    use std::sync::OnceLock;
    use std::time::Duration;

    use tracing::{error, info, warn};
    use uipc_core::{AtomRegionSource, RetryTimer};
    use windows::Win32::Foundation::*;
    use windows::Win32::Graphics::Gdi::{BeginPaint, EndPaint, InvalidateRect, PAINTSTRUCT, TextOutW};
    use windows::Win32::System::DataExchange::COPYDATASTRUCT;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse::VK_F5;
    use windows::Win32::UI::WindowsAndMessaging::*;
    use windows::core::PCWSTR;

    use super::{FS6_MESSAGE, IPC_MESSAGE, WINDOW_CLASS};
    use crate::config::{BridgeConfig, ConfigSource};
    use crate::host::BridgeHost;

    const RETRY_TIMER_ID: usize = 1;

    type Host = BridgeHost<WindowTimer, AtomRegionSource>;

    /// State stored in GWLP_USERDATA. The `RefCell` turns re-entrant
    /// calls into "not handled" instead of aliasing the host.
    struct WindowState {
        host: Host,
        config: ConfigSource,
    }

    #[derive(Debug, Clone, Copy)]
    struct RegisteredMessages {
        ipc: u32,
        fs6: u32,
    }

    static MESSAGES: OnceLock<RegisteredMessages> = OnceLock::new();

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    // ── Retry timer ──────────────────────────────────────────────

    /// `SetTimer` on the host window; expiries arrive as `WM_TIMER`.
    pub struct WindowTimer {
        hwnd: HWND,
    }

    impl RetryTimer for WindowTimer {
        fn arm(&mut self, period: Duration) {
            let ms = u32::try_from(period.as_millis()).unwrap_or(u32::MAX);
            if unsafe { SetTimer(self.hwnd, RETRY_TIMER_ID, ms, None) } == 0 {
                warn!("SetTimer failed: {}", windows::core::Error::from_win32());
            }
        }

        fn disarm(&mut self) {
            let _ = unsafe { KillTimer(self.hwnd, RETRY_TIMER_ID) };
        }
    }

    // ── Window procedure ─────────────────────────────────────────

    unsafe extern "system" fn wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let state_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const RefCell<WindowState>;

        if msg == WM_NCDESTROY && !state_ptr.is_null() {
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                drop(Box::from_raw(state_ptr as *mut RefCell<WindowState>));
            }
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }

        if state_ptr.is_null() {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }

        let cell = unsafe { &*state_ptr };
        let Ok(mut state) = cell.try_borrow_mut() else {
            // A request is still in flight on this thread.
            return match msg {
                WM_COPYDATA => LRESULT(0),
                _ if is_registered(msg) => LRESULT(0),
                _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
            };
        };

        let messages = MESSAGES.get().copied();

        match msg {
            WM_COPYDATA => {
                let handled = unsafe { copy_data(&mut state.host, lparam) };
                repaint(hwnd);
                LRESULT(handled as isize)
            }
            _ if messages.is_some_and(|m| m.ipc == msg) => {
                let handled = state.host.handle_region_request(wparam.0 as u32, lparam.0);
                repaint(hwnd);
                LRESULT(handled as isize)
            }
            _ if messages.is_some_and(|m| m.fs6 == msg) => LRESULT(1),
            WM_TIMER if wparam.0 == RETRY_TIMER_ID => {
                state.host.on_tick();
                repaint(hwnd);
                LRESULT(0)
            }
            WM_KEYDOWN if wparam.0 == usize::from(VK_F5.0) => {
                let source = state.config.clone();
                if let Err(e) = state.host.reload(|| source.resolve_from_env()) {
                    warn!("reload ignored: {e}");
                }
                repaint(hwnd);
                LRESULT(0)
            }
            WM_PAINT => {
                paint(hwnd, &state.host);
                LRESULT(0)
            }
            WM_DESTROY => {
                state.host.shutdown();
                unsafe { PostQuitMessage(0) };
                LRESULT(0)
            }
            _ => {
                drop(state);
                unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
            }
        }
    }

    fn is_registered(msg: u32) -> bool {
        MESSAGES.get().is_some_and(|m| m.ipc == msg || m.fs6 == msg)
    }

    /// # Safety
    /// `lparam` must be the `COPYDATASTRUCT` pointer of a `WM_COPYDATA`.
    unsafe fn copy_data(host: &mut Host, lparam: LPARAM) -> bool {
        let cds = lparam.0 as *const COPYDATASTRUCT;
        if cds.is_null() {
            return true;
        }
        let cds = unsafe { &*cds };
        // Only the low 32 bits of dwData travel on the wire.
        let tag = cds.dwData as u32;
        let block = if cds.lpData.is_null() || cds.cbData == 0 {
            None
        } else {
            Some(unsafe { std::slice::from_raw_parts_mut(cds.lpData.cast::<u8>(), cds.cbData as usize) })
        };
        host.handle_copy_data(tag, block)
    }

    fn repaint(hwnd: HWND) {
        let _ = unsafe { InvalidateRect(hwnd, None, true) };
    }

    fn paint(hwnd: HWND, host: &Host) {
        let mut ps = PAINTSTRUCT::default();
        unsafe {
            let hdc = BeginPaint(hwnd, &mut ps);
            let status: Vec<u16> = host.status_line().encode_utf16().collect();
            let peer: Vec<u16> = format!("Peer: {}", host.endpoint()).encode_utf16().collect();
            let _ = TextOutW(hdc, 8, 8, &status);
            let _ = TextOutW(hdc, 8, 28, &peer);
            let _ = EndPaint(hwnd, &ps);
        }
    }

    // ── HostWindow ───────────────────────────────────────────────

    /// The bridge's top-level window.
    pub struct HostWindow {
        hwnd: HWND,
    }

    impl HostWindow {
        /// Create the window, build the bridge inside it and make the first
        /// connection attempt.
        pub fn create(config: &BridgeConfig, source: ConfigSource) -> Result<Self, String> {
            let hinstance = unsafe { GetModuleHandleW(None) }
                .map_err(|e| format!("GetModuleHandle: {e}"))?;

            let class_name = wide(WINDOW_CLASS);
            let wc = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: hinstance.into(),
                lpszClassName: PCWSTR(class_name.as_ptr()),
                hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
                ..Default::default()
            };
            if unsafe { RegisterClassW(&wc) } == 0 {
                return Err("RegisterClassW failed".into());
            }

            let ipc = unsafe { RegisterWindowMessageW(PCWSTR(wide(IPC_MESSAGE).as_ptr())) };
            let fs6 = unsafe { RegisterWindowMessageW(PCWSTR(wide(FS6_MESSAGE).as_ptr())) };
            if ipc == 0 || fs6 == 0 {
                return Err("RegisterWindowMessageW failed".into());
            }
            let _ = MESSAGES.set(RegisteredMessages { ipc, fs6 });

            let hwnd = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE(0),
                    PCWSTR(class_name.as_ptr()),
                    PCWSTR(class_name.as_ptr()),
                    WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    480,
                    120,
                    None,
                    None,
                    hinstance,
                    None,
                )
            }
            .map_err(|e| format!("CreateWindowExW failed: {e}"))?;

            let host = BridgeHost::new(config, WindowTimer { hwnd }, AtomRegionSource)
                .map_err(|e| format!("runtime: {e}"))?;
            let state = Box::new(RefCell::new(WindowState {
                host,
                config: source,
            }));
            let state_ptr = Box::into_raw(state);
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, state_ptr as isize);
            }

            // No messages are pumped yet, so nothing else holds the state.
            if let Ok(mut state) = unsafe { &*state_ptr }.try_borrow_mut() {
                state.host.start();
            }
            repaint(hwnd);

            info!(class = WINDOW_CLASS, ipc, fs6, "host window ready");
            Ok(Self { hwnd })
        }

        /// Pump messages until `WM_QUIT`. Returns the exit code.
        pub fn run(&self) -> i32 {
            let mut msg = MSG::default();
            loop {
                let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                if ret.0 == 0 {
                    return msg.wParam.0 as i32;
                }
                if ret.0 < 0 {
                    error!("GetMessageW: {}", windows::core::Error::from_win32());
                    return 1;
                }
                unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
        }

        pub fn hwnd(&self) -> HWND {
            self.hwnd
        }
    }

    impl Drop for HostWindow {
        fn drop(&mut self) {
            unsafe {
                if IsWindow(self.hwnd).as_bool() {
                    let _ = DestroyWindow(self.hwnd);
                }
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use crate::config::{BridgeConfig, ConfigSource};

    pub struct HostWindow;

    impl HostWindow {
        pub fn create(_config: &BridgeConfig, _source: ConfigSource) -> Result<Self, String> {
            Err("the host window is only supported on Windows".into())
        }

        pub fn run(&self) -> i32 {
            0
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;

// ── Tests ────────────────────────────────────────────────────────
