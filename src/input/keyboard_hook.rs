//! Global low-level keyboard hook feeding the key queue.
//!
//! The hook runs on its own message thread so its callback keeps firing no
//! matter how long the render thread spends between ticks. The callback only
//! normalizes the code and bumps the queue cursor before chaining on.

use crate::input::KeyQueue;
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct KeyboardHook {
    active: bool,
    #[cfg(windows)]
    backend: platform::KeyboardHookBackend,
}

impl KeyboardHook {
    /// Installs the hook and routes its events into `queue`. The returned
    /// handle removes the hook when dropped.
    pub fn subscribe(queue: Arc<KeyQueue>) -> Result<Self> {
        let mut hook = Self::default();
        hook.activate(queue)?;
        Ok(hook)
    }

    pub fn activate(&mut self, queue: Arc<KeyQueue>) -> Result<()> {
        if self.active {
            return Ok(());
        }

        #[cfg(windows)]
        self.backend.install(queue)?;
        #[cfg(not(windows))]
        drop(queue);

        tracing::info!("low-level keyboard hook installed");
        self.active = true;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }

        #[cfg(windows)]
        if let Err(err) = self.backend.uninstall() {
            tracing::warn!(?err, "failed to uninstall keyboard hook");
        }

        tracing::info!("low-level keyboard hook removed");
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        #[cfg(windows)]
        {
            self.active && self.backend.is_installed()
        }
        #[cfg(not(windows))]
        {
            self.active
        }
    }
}

impl Drop for KeyboardHook {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(windows)]
mod platform {
    use crate::input::{deliver_raw_key, KeyQueue, KeySource};
    use anyhow::{anyhow, Result};
    use once_cell::sync::Lazy;
    use std::sync::{Arc, RwLock};
    use std::thread::JoinHandle;
    use std::time::Duration;

    // Written on install/uninstall only; the callback takes the shared side.
    static HOOK_QUEUE: Lazy<RwLock<Option<Arc<KeyQueue>>>> = Lazy::new(|| RwLock::new(None));

    #[derive(Debug)]
    struct HookThread {
        thread_id: u32,
        join: JoinHandle<()>,
    }

    #[derive(Debug, Default)]
    pub struct KeyboardHookBackend {
        hook_thread: Option<HookThread>,
    }

    impl KeyboardHookBackend {
        pub fn install(&mut self, queue: Arc<KeyQueue>) -> Result<()> {
            if self.hook_thread.is_some() {
                return Ok(());
            }

            if let Ok(mut guard) = HOOK_QUEUE.write() {
                *guard = Some(queue);
            }

            use windows::Win32::System::LibraryLoader::GetModuleHandleW;
            use windows::Win32::System::Threading::GetCurrentThreadId;
            use windows::Win32::UI::WindowsAndMessaging::{
                DispatchMessageW, GetMessageW, PeekMessageW, SetWindowsHookExW, TranslateMessage,
                UnhookWindowsHookEx, MSG, PM_NOREMOVE, WH_KEYBOARD_LL,
            };

            let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32>>(1);

            let join = std::thread::Builder::new()
                .name("keyboard-hook".to_string())
                .spawn(move || {
                    let mut msg = MSG::default();
                    unsafe {
                        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                    }

                    let thread_id = unsafe { GetCurrentThreadId() };
                    let hmodule = match unsafe { GetModuleHandleW(None) } {
                        Ok(h) => h,
                        Err(err) => {
                            let _ = ready_tx.send(Err(anyhow!(err)));
                            return;
                        }
                    };

                    let keyboard_hook = match unsafe {
                        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), hmodule, 0)
                    } {
                        Ok(h) if !h.0.is_null() => h,
                        Ok(_) => {
                            let _ =
                                ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                            return;
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(anyhow!(err)));
                            return;
                        }
                    };

                    let _ = ready_tx.send(Ok(thread_id));

                    loop {
                        let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                        if r.0 <= 0 {
                            break;
                        }
                        unsafe {
                            let _ = TranslateMessage(&msg);
                            DispatchMessageW(&msg);
                        }
                    }

                    unsafe {
                        let _ = UnhookWindowsHookEx(keyboard_hook);
                    }
                })
                .map_err(|err| anyhow!("failed to spawn keyboard hook thread: {err}"))?;

            let thread_id = match ready_rx.recv_timeout(Duration::from_secs(2)) {
                Ok(Ok(id)) => id,
                Ok(Err(err)) => {
                    clear_queue();
                    return Err(err);
                }
                Err(_) => {
                    clear_queue();
                    return Err(anyhow!("keyboard hook thread did not signal readiness"));
                }
            };

            self.hook_thread = Some(HookThread { thread_id, join });
            Ok(())
        }

        pub fn uninstall(&mut self) -> Result<()> {
            clear_queue();

            if let Some(th) = self.hook_thread.take() {
                use windows::Win32::Foundation::{LPARAM, WPARAM};
                use windows::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT};
                unsafe {
                    PostThreadMessageW(th.thread_id, WM_QUIT, WPARAM(0), LPARAM(0))
                        .map_err(|err| anyhow!("post quit to keyboard hook thread: {err}"))?;
                }
                th.join
                    .join()
                    .map_err(|_| anyhow!("keyboard hook thread panicked"))?;
            }

            Ok(())
        }

        pub fn is_installed(&self) -> bool {
            self.hook_thread.is_some()
        }
    }

    fn clear_queue() {
        if let Ok(mut guard) = HOOK_QUEUE.write() {
            *guard = None;
        }
    }

    unsafe extern "system" fn keyboard_hook_proc(
        n_code: i32,
        w_param: windows::Win32::Foundation::WPARAM,
        l_param: windows::Win32::Foundation::LPARAM,
    ) -> windows::Win32::Foundation::LRESULT {
        use windows::Win32::UI::WindowsAndMessaging::{
            CallNextHookEx, HC_ACTION, KBDLLHOOKSTRUCT, WM_KEYDOWN, WM_KEYUP,
        };

        if n_code == HC_ACTION as i32 {
            let msg = w_param.0 as u32;
            if msg == WM_KEYDOWN || msg == WM_KEYUP {
                let info = unsafe { &*(l_param.0 as *const KBDLLHOOKSTRUCT) };
                if let Ok(guard) = HOOK_QUEUE.read() {
                    if let Some(queue) = guard.as_ref() {
                        deliver_raw_key(queue, KeySource::Hook, msg == WM_KEYDOWN, info.vkCode);
                    }
                }
            }
        }

        CallNextHookEx(
            windows::Win32::UI::WindowsAndMessaging::HHOOK(std::ptr::null_mut()),
            n_code,
            w_param,
            l_param,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_is_active_until_dropped() {
        let queue = Arc::new(KeyQueue::default());
        let mut hook = KeyboardHook::default();
        assert!(!hook.is_active());

        hook.activate(Arc::clone(&queue))
            .expect("hook activate should not fail in tests");
        assert!(hook.is_active());

        hook.deactivate();
        assert!(!hook.is_active());
    }

    #[test]
    fn second_activation_is_a_no_op() {
        let queue = Arc::new(KeyQueue::default());
        let mut hook = KeyboardHook::subscribe(Arc::clone(&queue)).expect("subscribe");
        hook.activate(queue).expect("re-activate");
        assert!(hook.is_active());
    }
}
