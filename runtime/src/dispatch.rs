// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::marker::PhantomData;

use castaway::cast;
use fvm_ipld_encoding::RawBytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ActorError;

/// Implement actor method dispatch:
///
/// ```ignore
/// type Actor;
/// #[derive(FromPrimitive)]
/// #[repr(u64)]
/// enum Method {
///     Constructor = 1,
/// }
/// impl ActorCode for Actor {
///     type Methods = Method;
///     actor_dispatch! {
///         Constructor => constructor,
///     }
/// }
/// ```
#[macro_export]
macro_rules! actor_dispatch {
    ($($(#[$m:meta])* $($method:ident)|* => $func:ident $([$tag:ident])?,)*) => {
        fn invoke_method<RT>(
            rt: &RT,
            method: fvm_shared::MethodNum,
            args: &fvm_ipld_encoding::RawBytes,
        ) -> Result<fvm_ipld_encoding::RawBytes, $crate::ActorError>
        where
            RT: $crate::runtime::Runtime,
        {
            match <Self::Methods as num_traits::FromPrimitive>::from_u64(method) {
                $($(#[$m])*
                  $crate::actor_dispatch!(@pattern $($method)|*) =>
                  $crate::actor_dispatch!(@target rt args $func $($tag)?),)*
                None => Err($crate::actor_error!(unhandled_message; "invalid method: {}", method)),
            }
        }
    };
    (@pattern $($method:ident)|+) => {
        Some($(Self::Methods::$method)|+)
    };
    (@target $rt:ident $args:ident $func:ident default_params) => {{
        $crate::dispatch_default($rt, Self::$func, $args)
    }};
    (@target $rt:ident $args:ident $func:ident) => {
        $crate::dispatch($rt, Self::$func, $args)
    };
}

pub trait Dispatch<RT> {
    fn call(self, rt: &RT, args: &RawBytes) -> Result<RawBytes, ActorError>;
}

pub struct Dispatcher<F, A> {
    func: F,
    _marker: PhantomData<fn(A)>,
}

impl<F, A> Dispatcher<F, A> {
    const fn new(f: F) -> Self {
        Dispatcher { func: f, _marker: PhantomData }
    }
}

/// Dispatch an actor method, deserializing the input and re-serializing the output.
///
/// This method automatically handles:
///
/// - Dispatching with or without a parameter depending on the handler's arity (0/1).
/// - Returning empty bytes if the return type is `Result<(), ActorError>`.
#[doc(hidden)]
pub fn dispatch<F, A, RT>(rt: &RT, func: F, arg: &RawBytes) -> Result<RawBytes, ActorError>
where
    Dispatcher<F, A>: Dispatch<RT>,
{
    Dispatcher::new(func).call(rt, arg)
}

/// Like [`dispatch`], but passes the default value if there are no parameters.
#[doc(hidden)]
pub fn dispatch_default<F, A, R, RT>(
    rt: &RT,
    func: F,
    arg: &RawBytes,
) -> Result<RawBytes, ActorError>
where
    F: FnOnce(&RT, A) -> Result<R, ActorError>,
    A: DeserializeOwned + Default,
    R: Serialize + 'static,
{
    let arg = if arg.is_empty() { A::default() } else { arg.deserialize()? };
    maybe_into_bytes((func)(rt, arg)?)
}

/// Serialize the passed value, or return empty bytes if it's `()`.
fn maybe_into_bytes<T: Serialize + 'static>(v: T) -> Result<RawBytes, ActorError> {
    if cast!(&v, &()).is_ok() {
        Ok(RawBytes::default())
    } else {
        Ok(RawBytes::serialize(&v)?)
    }
}

impl<F, R, RT> Dispatch<RT> for Dispatcher<F, ()>
where
    F: FnOnce(&RT) -> Result<R, ActorError>,
    R: Serialize + 'static,
{
    fn call(self, rt: &RT, args: &RawBytes) -> Result<RawBytes, ActorError> {
        if !args.is_empty() {
            return Err(ActorError::illegal_argument("method expects no arguments".into()));
        }
        maybe_into_bytes((self.func)(rt)?)
    }
}

impl<F, A, R, RT> Dispatch<RT> for Dispatcher<F, (A,)>
where
    F: FnOnce(&RT, A) -> Result<R, ActorError>,
    A: DeserializeOwned,
    R: Serialize + 'static,
{
    fn call(self, rt: &RT, args: &RawBytes) -> Result<RawBytes, ActorError> {
        if args.is_empty() {
            return Err(ActorError::illegal_argument("method expects arguments".into()));
        }
        maybe_into_bytes((self.func)(rt, args.deserialize()?)?)
    }
}
