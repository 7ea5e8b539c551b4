//! Animation-frame driven render loop

use std::cell::RefCell;
use std::rc::Rc;

use super::viewer::ViewerSession;
use super::Surface;

/// The host's animation-frame primitive.
pub trait FrameScheduler {
    /// Dropping the handle cancels the request if it has not fired yet.
    type Handle: 'static;

    fn request(&self, callback: Box<dyn FnOnce(f64)>) -> Self::Handle;
}

/// `requestAnimationFrame` on the browser window.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnimationFrames;

impl FrameScheduler for AnimationFrames {
    type Handle = gloo_render::AnimationFrame;

    fn request(&self, callback: Box<dyn FnOnce(f64)>) -> Self::Handle {
        gloo_render::request_animation_frame(callback)
    }
}

/// Run `session` once per animation frame until it is disposed.
///
/// The pending request lives in the session, so disposing it cancels the next
/// frame. The loop only holds a weak reference to the session.
pub fn start<S, F>(session: &Rc<RefCell<ViewerSession<S>>>, scheduler: Rc<F>)
where
    S: Surface + 'static,
    F: FrameScheduler + 'static,
{
    schedule(session, scheduler);
}

fn schedule<S, F>(session: &Rc<RefCell<ViewerSession<S>>>, scheduler: Rc<F>)
where
    S: Surface + 'static,
    F: FrameScheduler + 'static,
{
    if !session.borrow().is_active() {
        return;
    }
    let weak = Rc::downgrade(session);
    let next = scheduler.clone();
    let handle = scheduler.request(Box::new(move |_timestamp| {
        let Some(session) = weak.upgrade() else {
            return;
        };
        let ticked = session.borrow_mut().tick();
        match ticked {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => log::error!("frame failed: {err}"),
        }
        schedule(&session, next);
    }));
    session.borrow_mut().set_frame_handle(Box::new(handle));
}
