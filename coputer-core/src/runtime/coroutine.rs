//! 协程
//!
//! 协程是无栈的：挂起时把自己的帧栈保存在 `Coroutine` 里，恢复时换回 VM。
//! `resume` 同步运行目标协程直到它让出、返回或出错。

use super::vm::{Exit, Frame, Resumed, Vm};
use crate::core::{CoroutineRef, Value, VmError};
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoStatus {
    NotStarted,
    Suspended,
    Running,
    /// 正在恢复另一个协程
    Normal,
    Dead,
}

impl CoStatus {
    /// `coroutine.status` 的返回值；尚未启动的协程也是 "suspended"
    pub fn as_str(self) -> &'static str {
        match self {
            CoStatus::NotStarted | CoStatus::Suspended => "suspended",
            CoStatus::Running => "running",
            CoStatus::Normal => "normal",
            CoStatus::Dead => "dead",
        }
    }
}

pub struct Coroutine {
    pub(crate) body: Value,
    pub(crate) status: CoStatus,
    pub(crate) frames: Vec<Frame>,
}

impl Coroutine {
    pub fn new(body: Value) -> CoroutineRef {
        Rc::new(RefCell::new(Coroutine {
            body,
            status: CoStatus::NotStarted,
            frames: Vec::new(),
        }))
    }

    pub fn status(&self) -> CoStatus {
        self.status
    }

    /// 标记为结束并丢弃挂起的帧
    pub fn close(&mut self) {
        self.status = CoStatus::Dead;
        self.frames.clear();
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("status", &self.status)
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl Vm {
    /// 恢复协程，返回它让出或返回的值。出错后协程结束。
    pub fn resume(&mut self, co: &CoroutineRef, args: Vec<Value>) -> Result<Resumed, VmError> {
        let status = co.borrow().status;
        match status {
            CoStatus::Dead => return Err(VmError::new("cannot resume dead coroutine")),
            CoStatus::Running => return Err(VmError::new("cannot resume running coroutine")),
            CoStatus::Normal => return Err(VmError::new("cannot resume non-suspended coroutine")),
            CoStatus::NotStarted | CoStatus::Suspended => {}
        }
        if !self.is_alive() {
            return Err(VmError::Cancelled);
        }
        self.enter_native()?;

        // 换入目标协程
        let previous = self.current.replace(co.clone());
        match &previous {
            Some(p) => p.borrow_mut().status = CoStatus::Normal,
            None => self.root = Some(co.clone()),
        }
        let saved_frames = mem::take(&mut self.frames);
        let saved_depth = mem::replace(&mut self.native_depth, 0);
        let (frames, body) = {
            let mut c = co.borrow_mut();
            c.status = CoStatus::Running;
            (mem::take(&mut c.frames), c.body.clone())
        };

        let result = match status {
            CoStatus::NotStarted => self.start_body(body, args),
            _ => {
                self.frames = frames;
                self.continue_frames(args)
            }
        };

        // 换回调用者
        let own_frames = mem::replace(&mut self.frames, saved_frames);
        self.native_depth = saved_depth;
        self.current = previous.clone();
        if let Some(p) = &previous {
            p.borrow_mut().status = CoStatus::Running;
        }
        self.leave_native();

        let mut c = co.borrow_mut();
        match result {
            Ok(Exit::Yield(values)) => {
                // 被 coroutine.close 关闭的协程保持结束状态
                if c.status == CoStatus::Running {
                    c.status = CoStatus::Suspended;
                    c.frames = own_frames;
                }
                Ok(Resumed::Yielded(values))
            }
            Ok(Exit::Return(values)) => {
                c.status = CoStatus::Dead;
                Ok(Resumed::Returned(values))
            }
            Err(err) => {
                c.status = CoStatus::Dead;
                debug!(target: "coputer::vm", error = %err, "coroutine died");
                Err(err)
            }
        }
    }
}
