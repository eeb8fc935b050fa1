//! Crate-level integration and BDD tests.
//!
//! [`FileProvider`] registers a small file-like namespace used by the
//! dispatch tests and the behaviour scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::{Dispatcher, Invocation, Response};
use crate::error::DispatchError;
use crate::namespace::{Descriptor, Namespace, OperationFlags};
use crate::request::{Request, RequestBuilder};
use crate::session::Session;
use crate::table::ObjectRef;
use crate::wire::{AttributeId, ObjectId};


pub(crate) const FILE_TYPE: u16 = 0x11;
pub(crate) const OP_BASE: u32 = 128;
pub(crate) const OPEN: u32 = OP_BASE;
pub(crate) const READ: u32 = OP_BASE + 1;
pub(crate) const STAMP: u32 = OP_BASE + 2;
pub(crate) const CLOSE: u32 = OP_BASE + 3;
pub(crate) const FAIL: u32 = OP_BASE + 4;
pub(crate) const LINK: u32 = OP_BASE + 5;
pub(crate) const TAGGED_OPEN: u32 = OP_BASE + 6;
pub(crate) const OP_END: u32 = OP_BASE + 7;

/// Status reported by the failing operation.
pub(crate) const DEVICE_ERROR: i32 = 5;
/// Status reported when `open` refuses an application context.
pub(crate) const ACCESS_DENIED: i32 = 13;
/// Application context the `open` handler refuses.
pub(crate) const REFUSED_CONTEXT: u64 = 0xDEAD;

pub(crate) struct FileProvider {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) namespace: Arc<Namespace>,
    pub(crate) id: u16,
    pub(crate) teardowns: Arc<AtomicUsize>,
    pub(crate) handler_calls: Arc<AtomicUsize>,
}

fn read_check(request: &Request) -> Result<(), DispatchError> {
    if request.objects().len() == 1 {
        Ok(())
    } else {
        Err(DispatchError::invalid_request("read names one file"))
    }
}

fn tagged_check(request: &Request, _objects: &[ObjectRef]) -> Result<(), DispatchError> {
    if request.arguments().len() >= 2 {
        Ok(())
    } else {
        Err(DispatchError::invalid_request("tagged open needs a tag argument"))
    }
}

pub(crate) fn file_provider() -> FileProvider {
    file_provider_with_capacity(16)
}

pub(crate) fn file_provider_with_capacity(capacity: u32) -> FileProvider {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::new(AtomicUsize::new(0));

    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };
    let on_open = counted(&handler_calls);
    let on_read = counted(&handler_calls);
    let on_stamp = counted(&handler_calls);
    let on_close = counted(&handler_calls);
    let on_fail = counted(&handler_calls);
    let on_link = counted(&handler_calls);
    let on_tagged = counted(&handler_calls);
    let teardown_counter = Arc::clone(&teardowns);

    let namespace = Namespace::builder("files")
        .op_base(OP_BASE)
        .handle_capacity(capacity)
        .operation(Descriptor::new(
            "open",
            OperationFlags::CREATES,
            move |call: &mut Invocation<'_>| {
                on_open();
                let created = call
                    .created()
                    .ok_or_else(|| DispatchError::handler(22, "no object created"))?;
                if created.app_context() == REFUSED_CONTEXT {
                    return Err(DispatchError::handler(ACCESS_DENIED, "context refused"));
                }
                let handle = created.handle();
                call.set_provider_context(created, Arc::new(format!("file-{handle}")));
                Ok(i64::from(handle))
            },
        ))
        .operation(
            Descriptor::new(
                "read",
                OperationFlags::empty(),
                move |call: &mut Invocation<'_>| {
                    on_read();
                    let file = call.objects().first().expect("checked by read_check");
                    Ok(i64::try_from(file.app_context()).expect("context fits"))
                },
            )
            .with_check(read_check),
        )
        .operation(Descriptor::new(
            "stamp",
            OperationFlags::empty(),
            move |call: &mut Invocation<'_>| {
                on_stamp();
                let bytes = call.argument_bytes_mut(0).expect("stamp argument");
                bytes.fill(0xAB);
                Ok(0)
            },
        ))
        .operation(Descriptor::new(
            "close",
            OperationFlags::DESTROYS,
            move |_call: &mut Invocation<'_>| {
                on_close();
                Ok(0)
            },
        ))
        .operation(Descriptor::new(
            "fail",
            OperationFlags::empty(),
            move |_call: &mut Invocation<'_>| {
                on_fail();
                Err(DispatchError::handler(DEVICE_ERROR, "device error"))
            },
        ))
        .operation(Descriptor::new(
            "link",
            OperationFlags::EXCLUSIVE,
            move |call: &mut Invocation<'_>| {
                on_link();
                Ok(i64::try_from(call.objects().len()).expect("small count"))
            },
        ))
        .operation(
            Descriptor::new(
                "tagged_open",
                OperationFlags::CREATES,
                move |call: &mut Invocation<'_>| {
                    on_tagged();
                    let created = call
                        .created()
                        .ok_or_else(|| DispatchError::handler(22, "no object created"))?;
                    Ok(i64::from(created.handle()))
                },
            )
            .with_argument_check(tagged_check),
        )
        .teardown(move |_, _| {
            teardown_counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .expect("valid namespace");

    let dispatcher = Dispatcher::new();
    let id = dispatcher
        .registry()
        .register(Arc::clone(&namespace))
        .expect("register files");

    FileProvider {
        dispatcher,
        namespace,
        id,
        teardowns,
        handler_calls,
    }
}

impl FileProvider {
    pub(crate) fn open_request(&self, app_context: u64) -> Vec<u8> {
        RequestBuilder::new(self.id, OPEN)
            .session_context(FILE_TYPE, app_context)
            .build()
            .expect("build open")
    }

    pub(crate) fn tagged_open_request(&self, app_context: u64, tag: Option<&[u8]>) -> Vec<u8> {
        let builder =
            RequestBuilder::new(self.id, TAGGED_OPEN).session_context(FILE_TYPE, app_context);
        let builder = match tag {
            Some(bytes) => builder.argument(AttributeId::Raw, 0, bytes.to_vec()),
            None => builder,
        };
        builder.build().expect("build tagged open")
    }

    pub(crate) fn request(&self, op: u32, handles: &[u32]) -> Vec<u8> {
        handles
            .iter()
            .fold(RequestBuilder::new(self.id, op), |builder, handle| {
                builder.object(ObjectId::new(*handle, FILE_TYPE))
            })
            .build()
            .expect("build request")
    }

    pub(crate) fn stamp_request(&self, handle: u32, len: usize) -> Vec<u8> {
        RequestBuilder::new(self.id, STAMP)
            .object(ObjectId::new(handle, FILE_TYPE))
            .argument(AttributeId::Raw, 0, vec![0; len])
            .build()
            .expect("build stamp")
    }

    pub(crate) fn open(&self, session: &Arc<Session>, app_context: u64) -> u32 {
        let response = self
            .dispatcher
            .dispatch(session, &self.open_request(app_context))
            .expect("open file");
        u32::try_from(response.status()).expect("handle status")
    }

    pub(crate) fn run(
        &self,
        session: &Arc<Session>,
        op: u32,
        handles: &[u32],
    ) -> Result<Response, DispatchError> {
        self.dispatcher.dispatch(session, &self.request(op, handles))
    }

    pub(crate) fn handler_calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Use count of whatever object carries `handle`.
    pub(crate) fn use_count(&self, handle: u32) -> u32 {
        self.namespace
            .table()
            .lookup(handle)
            .expect("object is live")
            .use_count
    }
}
